//! 阶段状态机
//!
//! 纯逻辑，无 I/O：(当前记录, 阶段, 阶段结果) → 新记录。
//!
//! ```text
//! Pending → Ingested → Indexed → Searched → Answered → Evaluated → Reported
//!     \________\__________\_________\__________\___________\→ Failed(phase, reason)
//! ```
//!
//! - 成功：写入阶段输出，进入下一状态，清零该阶段的失败计数
//! - transient 失败：计数 +1，未达上限保持原状态，达到上限进入 `Failed`
//! - fatal 失败：立即进入 `Failed`

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::error::PhaseError;
use crate::models::{Evaluation, IngestResult, Phase, PhaseState, QuestionRecord};
use crate::pipeline::classifier::FailureClass;

/// 阶段成功时的输出
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutput {
    Ingested(IngestResult),
    Indexed,
    Searched(Vec<JsonValue>),
    Answered(String),
    Evaluated(Evaluation),
    Reported,
}

impl PhaseOutput {
    /// 产生该输出的阶段
    pub fn phase(&self) -> Phase {
        match self {
            PhaseOutput::Ingested(_) => Phase::Ingest,
            PhaseOutput::Indexed => Phase::Index,
            PhaseOutput::Searched(_) => Phase::Search,
            PhaseOutput::Answered(_) => Phase::Answer,
            PhaseOutput::Evaluated(_) => Phase::Evaluate,
            PhaseOutput::Reported => Phase::Report,
        }
    }
}

/// 一次阶段调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Success { output: PhaseOutput, duration_ms: u64 },
    Failure { class: FailureClass, error: PhaseError },
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// 失败次数是否已经用尽
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// 非法迁移
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("题目 {question_id} 已处于终止状态 {state}")]
    Terminal { question_id: String, state: String },

    #[error("题目 {question_id} 当前应执行 {expected}，但收到 {actual} 的结果")]
    OutOfOrder {
        question_id: String,
        expected: Phase,
        actual: Phase,
    },
}

/// 根据阶段结果推进记录
pub fn advance(
    record: &QuestionRecord,
    phase: Phase,
    outcome: PhaseOutcome,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Result<QuestionRecord, TransitionError> {
    let expected = record.state.next_phase().ok_or_else(|| TransitionError::Terminal {
        question_id: record.question_id.clone(),
        state: record.state.to_string(),
    })?;

    if expected != phase {
        return Err(TransitionError::OutOfOrder {
            question_id: record.question_id.clone(),
            expected,
            actual: phase,
        });
    }

    let mut next = record.clone();
    next.updated_at = now;

    match outcome {
        PhaseOutcome::Success {
            output,
            duration_ms,
        } => {
            if output.phase() != phase {
                return Err(TransitionError::OutOfOrder {
                    question_id: record.question_id.clone(),
                    expected: phase,
                    actual: output.phase(),
                });
            }

            match output {
                PhaseOutput::Ingested(result) => next.ingest_result = Some(result),
                PhaseOutput::Searched(results) => next.search_results = Some(results),
                PhaseOutput::Answered(hypothesis) => next.hypothesis = Some(hypothesis),
                PhaseOutput::Evaluated(evaluation) => next.evaluation = Some(evaluation),
                PhaseOutput::Indexed | PhaseOutput::Reported => {}
            }

            next.state = phase.completed_state();
            next.attempts.remove(&phase);
            next.durations_ms.insert(phase, duration_ms);
            next.last_error = None;
        }

        PhaseOutcome::Failure { class, error } => {
            let reason = error.to_string();
            let attempts = record.attempts_for(phase) + 1;
            next.attempts.insert(phase, attempts);
            next.last_error = Some(reason.clone());

            let give_up = match class {
                FailureClass::Fatal => true,
                FailureClass::Transient => policy.exhausted(attempts),
            };

            if give_up {
                next.state = PhaseState::Failed { phase, reason };
            }
        }
    }

    Ok(next)
}

/// 将记录直接标记为失败（用于无法执行阶段的情况，例如题目数据缺失）
pub fn fail(record: &QuestionRecord, phase: Phase, reason: impl Into<String>, now: DateTime<Utc>) -> QuestionRecord {
    let reason = reason.into();
    let mut next = record.clone();
    next.updated_at = now;
    next.last_error = Some(reason.clone());
    next.state = PhaseState::Failed { phase, reason };
    next
}
