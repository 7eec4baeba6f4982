//! 阶段执行流程 - 流程层
//!
//! 核心职责：把题目的当前状态映射为一次外部调用
//!
//! | 阶段     | 调用                          | 输入                     |
//! |----------|-------------------------------|--------------------------|
//! | Ingest   | `Provider::ingest`            | 题目的历史会话           |
//! | Index    | `Provider::await_indexing`    | ingestResult             |
//! | Search   | `Provider::search`            | 问题文本                 |
//! | Answer   | 回答者 `Generator::generate`  | 问题 + searchResults     |
//! | Evaluate | 裁判 `Generator::generate`    | 问题 + 标准答案 + 回答   |
//! | Report   | 本地，无外部调用              | -                        |
//!
//! 每次调用都有超时；错误在这里完成分类，不会向上传播。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{PhaseError, PhaseResult};
use crate::models::{BenchmarkQuestion, Phase, QuestionRecord, RunConfigSnapshot};
use crate::pipeline::{FailureClass, PhaseOutcome, PhaseOutput};
use crate::services::prompts::{build_answer_prompt, build_judge_prompt, parse_judge_response};
use crate::services::{Generator, IngestOptions, PollOptions, Provider, SearchOptions};
use crate::workflow::question_ctx::QuestionCtx;

/// 重试退避上限
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 阶段执行流程
///
/// - 不持有题目状态，输入全部来自记录和数据集
/// - 只依赖能力接口（Provider / Generator）
pub struct PhaseFlow {
    provider: Arc<dyn Provider>,
    answerer: Arc<dyn Generator>,
    judge: Arc<dyn Generator>,
    call_timeout: Duration,
    poll: PollOptions,
    search_limit: usize,
    retry_backoff_ms: u64,
}

impl PhaseFlow {
    pub fn new(
        provider: Arc<dyn Provider>,
        answerer: Arc<dyn Generator>,
        judge: Arc<dyn Generator>,
        config: &RunConfigSnapshot,
    ) -> Self {
        Self {
            provider,
            answerer,
            judge,
            call_timeout: Duration::from_secs(config.phase_timeout_secs),
            poll: PollOptions::from_snapshot(config),
            search_limit: config.search_limit,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// 已失败 `failed_attempts` 次后，下一次尝试前的等待时间
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 || self.retry_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (failed_attempts - 1).min(20);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }

    /// 执行一次阶段调用，返回交给状态机的结果
    pub async fn execute(
        &self,
        phase: Phase,
        record: &QuestionRecord,
        question: Option<&BenchmarkQuestion>,
        ctx: &QuestionCtx,
    ) -> PhaseOutcome {
        debug!(
            "{} ▶ 执行 {} 阶段 (第 {} 次)",
            ctx,
            phase,
            record.attempts_for(phase) + 1
        );

        let started = Instant::now();
        match self.call(phase, record, question).await {
            Ok(output) => PhaseOutcome::Success {
                output,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(error) => PhaseOutcome::Failure {
                class: self.classify(phase, &error),
                error,
            },
        }
    }

    /// Provider 阶段由 Provider 分类，回答与评测由对应的 Generator 分类
    pub fn classify(&self, phase: Phase, error: &PhaseError) -> FailureClass {
        match phase {
            Phase::Answer => self.answerer.classify(phase, error),
            Phase::Evaluate => self.judge.classify(phase, error),
            _ => self.provider.classify(phase, error),
        }
    }

    async fn call(
        &self,
        phase: Phase,
        record: &QuestionRecord,
        question: Option<&BenchmarkQuestion>,
    ) -> PhaseResult<PhaseOutput> {
        let container_tag = record.container_tag.as_str();

        match phase {
            // ========== 写入 ==========
            Phase::Ingest => {
                let question = require_question(question, record)?;
                let options = IngestOptions {
                    container_tag: container_tag.to_string(),
                };
                let result = self
                    .with_timeout(phase, self.call_timeout, self.provider.ingest(&question.sessions, &options))
                    .await?;
                Ok(PhaseOutput::Ingested(result))
            }

            // ========== 等待索引 ==========
            Phase::Index => {
                let ingest_result = record.ingest_result.as_ref().ok_or_else(|| {
                    PhaseError::MalformedInput(format!("题目 {} 缺少 ingestResult", record.question_id))
                })?;
                // 轮询自带总超时，外层只兜底
                let limit = self.poll.timeout + self.call_timeout;
                self.with_timeout(
                    phase,
                    limit,
                    self.provider.await_indexing(ingest_result, container_tag, &self.poll),
                )
                .await?;
                Ok(PhaseOutput::Indexed)
            }

            // ========== 检索 ==========
            Phase::Search => {
                let question = require_question(question, record)?;
                let options = SearchOptions {
                    container_tag: container_tag.to_string(),
                    limit: self.search_limit,
                };
                let results = self
                    .with_timeout(phase, self.call_timeout, self.provider.search(&question.question, &options))
                    .await?;
                Ok(PhaseOutput::Searched(results))
            }

            // ========== 回答 ==========
            Phase::Answer => {
                let question = require_question(question, record)?;
                let search_results = record.search_results.as_deref().ok_or_else(|| {
                    PhaseError::MalformedInput(format!("题目 {} 缺少 searchResults", record.question_id))
                })?;
                let prompt = build_answer_prompt(question, search_results);
                let hypothesis = self
                    .with_timeout(phase, self.call_timeout, self.answerer.generate(&prompt))
                    .await?;
                Ok(PhaseOutput::Answered(hypothesis))
            }

            // ========== 评测 ==========
            Phase::Evaluate => {
                let question = require_question(question, record)?;
                let hypothesis = record.hypothesis.as_deref().ok_or_else(|| {
                    PhaseError::MalformedInput(format!("题目 {} 缺少 hypothesis", record.question_id))
                })?;
                let prompt = build_judge_prompt(question, hypothesis);
                let response = self
                    .with_timeout(phase, self.call_timeout, self.judge.generate(&prompt))
                    .await?;
                Ok(PhaseOutput::Evaluated(parse_judge_response(&response)?))
            }

            Phase::Report => Ok(PhaseOutput::Reported),
        }
    }

    async fn with_timeout<T, F>(&self, phase: Phase, limit: Duration, call: F) -> PhaseResult<T>
    where
        F: Future<Output = PhaseResult<T>>,
    {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(PhaseError::timeout(phase.name(), limit.as_millis() as u64)),
        }
    }
}

/// 恢复运行时数据集可能已经变化，题目缺失属于不可恢复的输入错误
fn require_question<'a>(
    question: Option<&'a BenchmarkQuestion>,
    record: &QuestionRecord,
) -> PhaseResult<&'a BenchmarkQuestion> {
    question.ok_or_else(|| {
        PhaseError::MalformedInput(format!("数据集中不存在题目 {}", record.question_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IngestResult, Message, PhaseState, Session};
    use crate::services::LocalProvider;
    use async_trait::async_trait;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl Generator for FixedGenerator {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str) -> PhaseResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct HangingGenerator;

    #[async_trait]
    impl Generator for HangingGenerator {
        fn model(&self) -> &str {
            "hanging"
        }

        async fn generate(&self, _prompt: &str) -> PhaseResult<String> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn flow_with(answerer: Arc<dyn Generator>, config: &RunConfigSnapshot) -> PhaseFlow {
        PhaseFlow::new(
            Arc::new(LocalProvider::new()),
            answerer,
            Arc::new(FixedGenerator(r#"{"label": 1, "explanation": "ok"}"#)),
            config,
        )
    }

    fn question() -> BenchmarkQuestion {
        BenchmarkQuestion {
            question_id: "q1".to_string(),
            question_type: "single-session-user".to_string(),
            question: "what is my cat called".to_string(),
            answer: "Luna".to_string(),
            question_date: None,
            sessions: vec![Session {
                session_id: "s1".to_string(),
                date: None,
                messages: vec![Message {
                    role: "user".to_string(),
                    content: "my cat is called Luna".to_string(),
                }],
            }],
        }
    }

    fn ctx() -> QuestionCtx {
        QuestionCtx::new("run-test", "q1", 1, 1)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RunConfigSnapshot {
            retry_backoff_ms: 1000,
            ..RunConfigSnapshot::default()
        };
        let flow = flow_with(Arc::new(FixedGenerator("a")), &config);

        assert_eq!(flow.backoff(0), Duration::ZERO);
        assert_eq!(flow.backoff(1), Duration::from_millis(1000));
        assert_eq!(flow.backoff(3), Duration::from_millis(4000));
        assert_eq!(flow.backoff(10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_executes_phases_in_sequence() {
        let config = RunConfigSnapshot::default();
        let flow = flow_with(Arc::new(FixedGenerator("Luna")), &config);
        let q = question();
        let mut record = QuestionRecord::new("q1", "single-session-user", "q1-run-test");

        let outcome = flow.execute(Phase::Ingest, &record, Some(&q), &ctx()).await;
        let PhaseOutcome::Success { output: PhaseOutput::Ingested(result), .. } = outcome else {
            panic!("ingest 应该成功");
        };
        record.ingest_result = Some(result);
        record.state = PhaseState::Ingested;

        let outcome = flow.execute(Phase::Index, &record, Some(&q), &ctx()).await;
        assert!(matches!(outcome, PhaseOutcome::Success { output: PhaseOutput::Indexed, .. }));

        let outcome = flow.execute(Phase::Search, &record, Some(&q), &ctx()).await;
        let PhaseOutcome::Success { output: PhaseOutput::Searched(results), .. } = outcome else {
            panic!("search 应该成功");
        };
        assert_eq!(results.len(), 1);
        record.search_results = Some(results);

        let outcome = flow.execute(Phase::Answer, &record, Some(&q), &ctx()).await;
        assert!(matches!(outcome, PhaseOutcome::Success { output: PhaseOutput::Answered(ref h), .. } if h == "Luna"));
        record.hypothesis = Some("Luna".to_string());

        let outcome = flow.execute(Phase::Evaluate, &record, Some(&q), &ctx()).await;
        assert!(matches!(
            outcome,
            PhaseOutcome::Success { output: PhaseOutput::Evaluated(ref e), .. } if e.is_correct()
        ));
    }

    #[tokio::test]
    async fn test_missing_question_is_fatal() {
        let flow = flow_with(Arc::new(FixedGenerator("a")), &RunConfigSnapshot::default());
        let record = QuestionRecord::new("q1", "t", "q1-run-test");

        let outcome = flow.execute(Phase::Ingest, &record, None, &ctx()).await;
        assert!(matches!(
            outcome,
            PhaseOutcome::Failure {
                class: FailureClass::Fatal,
                error: PhaseError::MalformedInput(_)
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_is_transient() {
        let config = RunConfigSnapshot {
            phase_timeout_secs: 5,
            ..RunConfigSnapshot::default()
        };
        let flow = flow_with(Arc::new(HangingGenerator), &config);
        let mut record = QuestionRecord::new("q1", "t", "q1-run-test");
        record.ingest_result = Some(IngestResult::default());
        record.search_results = Some(Vec::new());

        let outcome = flow.execute(Phase::Answer, &record, Some(&question()), &ctx()).await;
        assert!(matches!(
            outcome,
            PhaseOutcome::Failure {
                class: FailureClass::Transient,
                error: PhaseError::Timeout { timeout_ms: 5000, .. }
            }
        ));
    }
}
