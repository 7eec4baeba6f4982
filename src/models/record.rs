//! 单道题在一次运行中的进度记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt::Display;

/// 流水线阶段，按执行顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Ingest,
    Index,
    Search,
    Answer,
    Evaluate,
    Report,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Ingest,
        Phase::Index,
        Phase::Search,
        Phase::Answer,
        Phase::Evaluate,
        Phase::Report,
    ];

    /// 阶段序号（从 0 开始）
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Ingest => "ingest",
            Phase::Index => "index",
            Phase::Search => "search",
            Phase::Answer => "answer",
            Phase::Evaluate => "evaluate",
            Phase::Report => "report",
        }
    }

    /// 本阶段成功后到达的状态
    pub fn completed_state(self) -> PhaseState {
        match self {
            Phase::Ingest => PhaseState::Ingested,
            Phase::Index => PhaseState::Indexed,
            Phase::Search => PhaseState::Searched,
            Phase::Answer => PhaseState::Answered,
            Phase::Evaluate => PhaseState::Evaluated,
            Phase::Report => PhaseState::Reported,
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 题目状态
///
/// `Pending → Ingested → Indexed → Searched → Answered → Evaluated → Reported`，
/// 任意非终止状态都可以进入 `Failed`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PhaseState {
    Pending,
    Ingested,
    Indexed,
    Searched,
    Answered,
    Evaluated,
    Reported,
    Failed { phase: Phase, reason: String },
}

impl PhaseState {
    /// 只有 `Reported` 和 `Failed` 是终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseState::Reported | PhaseState::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PhaseState::Failed { .. })
    }

    /// 当前状态下需要执行的下一个阶段
    pub fn next_phase(&self) -> Option<Phase> {
        match self {
            PhaseState::Pending => Some(Phase::Ingest),
            PhaseState::Ingested => Some(Phase::Index),
            PhaseState::Indexed => Some(Phase::Search),
            PhaseState::Searched => Some(Phase::Answer),
            PhaseState::Answered => Some(Phase::Evaluate),
            PhaseState::Evaluated => Some(Phase::Report),
            PhaseState::Reported | PhaseState::Failed { .. } => None,
        }
    }

    /// 已成功完成的阶段数量
    pub fn progress(&self) -> usize {
        match self {
            PhaseState::Pending => 0,
            PhaseState::Ingested => 1,
            PhaseState::Indexed => 2,
            PhaseState::Searched => 3,
            PhaseState::Answered => 4,
            PhaseState::Evaluated => 5,
            PhaseState::Reported => 6,
            PhaseState::Failed { phase, .. } => phase.index(),
        }
    }

    /// 是否已经完成评测（`Evaluated` 或 `Reported`）
    pub fn reached_evaluation(&self) -> bool {
        matches!(self, PhaseState::Evaluated | PhaseState::Reported)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PhaseState::Pending => "pending",
            PhaseState::Ingested => "ingested",
            PhaseState::Indexed => "indexed",
            PhaseState::Searched => "searched",
            PhaseState::Answered => "answered",
            PhaseState::Evaluated => "evaluated",
            PhaseState::Reported => "reported",
            PhaseState::Failed { .. } => "failed",
        }
    }
}

impl Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseState::Failed { phase, reason } => write!(f, "failed({}: {})", phase, reason),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Provider 写入结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub document_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_ids: Vec<String>,
}

/// 评测结果：label=1 表示回答正确
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub label: u8,
    pub explanation: String,
}

impl Evaluation {
    pub fn is_correct(&self) -> bool {
        self.label == 1
    }
}

/// 单道题的进度记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuestionRecord {
    pub question_id: String,
    pub question_type: String,
    pub container_tag: String,
    pub state: PhaseState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_result: Option<IngestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,

    /// 每个阶段已失败的次数，阶段成功后清零
    #[serde(default)]
    pub attempts: BTreeMap<Phase, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// 每个成功阶段的耗时（毫秒）
    #[serde(default)]
    pub durations_ms: BTreeMap<Phase, u64>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionRecord {
    pub fn new(
        question_id: impl Into<String>,
        question_type: impl Into<String>,
        container_tag: impl Into<String>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            question_type: question_type.into(),
            container_tag: container_tag.into(),
            state: PhaseState::Pending,
            ingest_result: None,
            search_results: None,
            hypothesis: None,
            evaluation: None,
            attempts: BTreeMap::new(),
            last_error: None,
            durations_ms: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn attempts_for(&self, phase: Phase) -> u32 {
        self.attempts.get(&phase).copied().unwrap_or(0)
    }

    /// 检查阶段输出与状态是否一致
    ///
    /// 某阶段的输出存在，当且仅当该阶段已经成功完成。
    pub fn check_phase_order(&self) -> Result<(), String> {
        let progress = self.state.progress();
        let outputs = [
            (Phase::Ingest, self.ingest_result.is_some()),
            (Phase::Search, self.search_results.is_some()),
            (Phase::Answer, self.hypothesis.is_some()),
            (Phase::Evaluate, self.evaluation.is_some()),
        ];

        for (phase, present) in outputs {
            let completed = progress > phase.index();
            if present && !completed {
                return Err(format!(
                    "题目 {} 状态为 {}，但已存在 {} 阶段的输出",
                    self.question_id, self.state, phase
                ));
            }
            if completed && !present {
                return Err(format!(
                    "题目 {} 状态为 {}，但缺少 {} 阶段的输出",
                    self.question_id, self.state, phase
                ));
            }
        }

        Ok(())
    }
}
