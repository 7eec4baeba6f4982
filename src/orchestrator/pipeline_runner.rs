//! 流水线运行器 - 编排层
//!
//! ## 职责
//!
//! 1. **创建/恢复**：有 checkpoint 就恢复，否则从数据集创建全新的 checkpoint
//! 2. **调度**：最多 K 个阶段调用同时在途，任意一个结束立即补位
//! 3. **推进**：调用结果交给状态机，得到新记录
//! 4. **持久化**：每次迁移后先保存 checkpoint，再释放该题的空位
//! 5. **取消**：停止准入，等待在途调用结束，已完成的进度全部落盘
//! 6. **报告**：没有可推进的题目后聚合报告
//!
//! 阶段错误永远不会从这里逃出，只有存储错误和 Provider 初始化错误会终止运行。

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::{BenchError, BenchResult, PhaseError, PhaseResult};
use crate::models::{BenchmarkQuestion, Checkpoint, Phase, QuestionRecord, Report, Run};
use crate::orchestrator::scheduler::{self, BatchScheduler};
use crate::pipeline::state_machine::{self, advance};
use crate::pipeline::{PhaseOutcome, RetryPolicy};
use crate::report::aggregate;
use crate::services::{Benchmark, Generator, Provider};
use crate::utils::logging::{log_cancelled, log_run_start, log_work_remaining};
use crate::utils::truncate_text;
use crate::workflow::{PhaseFlow, QuestionCtx};

/// 运行参数
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// 存在 checkpoint 时是否恢复
    pub resume: bool,
    /// 全新运行时只取前 N 道题
    pub limit: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: true,
            limit: None,
        }
    }
}

/// 一次 `run_pipeline` 的结果
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: Report,
    pub checkpoint: Checkpoint,
    /// 是否从已有 checkpoint 恢复
    pub resumed: bool,
    /// 是否因取消而提前结束（仍有未完成的题目）
    pub cancelled: bool,
}

/// 清理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub cleared: usize,
    /// Provider 侧已经不存在，视为成功
    pub already_cleared: usize,
    /// (containerTag, 原因)
    pub failed: Vec<(String, String)>,
}

impl CleanupSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

type QuestionIndex = HashMap<String, Arc<BenchmarkQuestion>>;

enum TaskResult {
    Finished(PhaseOutcome),
    /// 取消信号到达时调用尚未完成，不产生任何迁移
    Cancelled,
    Panicked(String),
}

/// 编排器
///
/// 只依赖能力接口，不认识任何具体的 Provider、裁判或数据集格式
pub struct Orchestrator {
    store: Arc<dyn CheckpointStore>,
    provider: Arc<dyn Provider>,
    answerer: Arc<dyn Generator>,
    judge: Arc<dyn Generator>,
    benchmark: Arc<dyn Benchmark>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        provider: Arc<dyn Provider>,
        answerer: Arc<dyn Generator>,
        judge: Arc<dyn Generator>,
        benchmark: Arc<dyn Benchmark>,
    ) -> Self {
        Self {
            store,
            provider,
            answerer,
            judge,
            benchmark,
        }
    }

    /// 运行（或恢复）整条流水线直到没有可推进的题目
    pub async fn run_pipeline(
        &self,
        run: Run,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> BenchResult<PipelineOutcome> {
        let mut questions: Option<QuestionIndex> = None;
        let mut provider_ready = false;

        let existing = if options.resume {
            self.store.load(&run.run_id).await?
        } else {
            None
        };
        let resumed = existing.is_some();

        let mut checkpoint = match existing {
            Some(checkpoint) => {
                if checkpoint.run.provider != run.provider {
                    warn!(
                        "⚠️ 运行 {} 创建时使用的 Provider 是 {}，当前为 {}，以 checkpoint 为准",
                        run.run_id, checkpoint.run.provider, run.provider
                    );
                }
                checkpoint
            }
            None => {
                let mut loaded = self.benchmark.load().await?;
                if let Some(limit) = options.limit {
                    loaded.truncate(limit);
                }
                self.initialize_provider(&run).await?;
                provider_ready = true;

                let checkpoint = Checkpoint::new(run, &loaded)?;
                self.store.save(&checkpoint).await?;
                questions = Some(index_questions(loaded));
                checkpoint
            }
        };

        let total = checkpoint.questions.len();
        log_run_start(&checkpoint.run, total, resumed);

        let policy = RetryPolicy::new(checkpoint.run.config.max_attempts);
        self.settle_exhausted(&mut checkpoint, &policy).await?;

        let mut scheduler = BatchScheduler::new(checkpoint.run.config.concurrency);
        let pending = scheduler::eligible(&checkpoint, &policy);
        log_work_remaining(pending.len(), total);
        scheduler.refill(pending);

        if !scheduler.is_idle() && !cancel.is_cancelled() {
            // 只有真正有活要干时才加载数据集和初始化 Provider
            let questions = match questions {
                Some(questions) => questions,
                None => index_questions(self.benchmark.load().await?),
            };
            if !provider_ready {
                self.initialize_provider(&checkpoint.run).await?;
            }

            let flow = Arc::new(PhaseFlow::new(
                self.provider.clone(),
                self.answerer.clone(),
                self.judge.clone(),
                &checkpoint.run.config,
            ));
            self.drive(
                &mut checkpoint,
                &mut scheduler,
                &policy,
                flow,
                Arc::new(questions),
                &cancel,
            )
            .await?;
        }

        let cancelled = cancel.is_cancelled() && !checkpoint.is_complete();
        if cancelled {
            info!("💾 运行 {} 已保存，可以稍后恢复", checkpoint.run.run_id);
        }

        Ok(PipelineOutcome {
            report: aggregate(&checkpoint),
            checkpoint,
            resumed,
            cancelled,
        })
    }

    /// 清除本次运行在 Provider 侧的全部数据
    pub async fn cleanup(&self, run_id: &str) -> BenchResult<CleanupSummary> {
        cleanup_run(self.store.as_ref(), self.provider.as_ref(), run_id).await
    }

    async fn initialize_provider(&self, run: &Run) -> BenchResult<()> {
        initialize(self.provider.as_ref(), run).await
    }

    /// 尝试次数已用尽却仍未失败的记录直接标记为失败
    async fn settle_exhausted(&self, checkpoint: &mut Checkpoint, policy: &RetryPolicy) -> BenchResult<()> {
        let stale = scheduler::exhausted(checkpoint, policy);
        if stale.is_empty() {
            return Ok(());
        }

        for question_id in &stale {
            let Some(record) = checkpoint.questions.get(question_id) else {
                continue;
            };
            let Some(phase) = record.state.next_phase() else {
                continue;
            };
            let reason = record
                .last_error
                .clone()
                .unwrap_or_else(|| format!("{} 阶段尝试次数已用尽", phase));
            let failed = state_machine::fail(record, phase, reason, Utc::now());
            checkpoint.questions.insert(question_id.clone(), failed);
        }

        warn!("⚠️ {} 道题的尝试次数已用尽，标记为失败", stale.len());
        self.store.save(checkpoint).await
    }

    // ========== 调度循环 ==========

    async fn drive(
        &self,
        checkpoint: &mut Checkpoint,
        scheduler: &mut BatchScheduler,
        policy: &RetryPolicy,
        flow: Arc<PhaseFlow>,
        questions: Arc<QuestionIndex>,
        cancel: &CancellationToken,
    ) -> BenchResult<()> {
        let total = checkpoint.questions.len();
        let run_id = checkpoint.run.run_id.clone();
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, (QuestionCtx, Phase)> = HashMap::new();
        let mut cancel_logged = false;

        loop {
            if cancel.is_cancelled() {
                if !cancel_logged {
                    log_cancelled(tasks.len());
                    cancel_logged = true;
                }
            } else {
                while let Some(question_id) = scheduler.admit() {
                    let Some(record) = checkpoint.questions.get(&question_id).cloned() else {
                        scheduler.complete(&question_id);
                        continue;
                    };
                    let Some(phase) = record.state.next_phase() else {
                        scheduler.complete(&question_id);
                        continue;
                    };

                    let ctx = QuestionCtx::new(
                        &run_id,
                        &question_id,
                        checkpoint.position_of(&question_id),
                        total,
                    );
                    let question = questions.get(&question_id).cloned();
                    let handle = tasks.spawn(run_phase(
                        flow.clone(),
                        phase,
                        record,
                        question,
                        ctx.clone(),
                        cancel.clone(),
                    ));
                    running.insert(handle.id(), (ctx, phase));
                }
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            let (task_id, result) = match joined {
                Ok((task_id, result)) => (task_id, result),
                Err(e) => (e.id(), TaskResult::Panicked(e.to_string())),
            };
            let Some((ctx, phase)) = running.remove(&task_id) else {
                continue;
            };

            // 先落盘，再释放空位
            let still_eligible = self
                .apply(checkpoint, &ctx, phase, result, policy)
                .await?;
            if still_eligible && !cancel.is_cancelled() {
                scheduler.requeue(ctx.question_id);
            } else {
                scheduler.complete(&ctx.question_id);
            }
        }

        Ok(())
    }

    /// 把一次调用的结果写入 checkpoint 并保存，返回该题是否仍可推进
    async fn apply(
        &self,
        checkpoint: &mut Checkpoint,
        ctx: &QuestionCtx,
        phase: Phase,
        result: TaskResult,
        policy: &RetryPolicy,
    ) -> BenchResult<bool> {
        let Some(record) = checkpoint.questions.get(&ctx.question_id) else {
            return Ok(false);
        };

        let next = match result {
            TaskResult::Cancelled => {
                debug!("{} {} 阶段被取消，保持原状态", ctx, phase);
                return Ok(true);
            }
            TaskResult::Panicked(reason) => {
                error!("{} ❌ {} 阶段任务异常退出: {}", ctx, phase, reason);
                state_machine::fail(record, phase, format!("任务异常退出: {}", reason), Utc::now())
            }
            TaskResult::Finished(outcome) => {
                let duration_ms = match &outcome {
                    PhaseOutcome::Success { duration_ms, .. } => Some(*duration_ms),
                    PhaseOutcome::Failure { .. } => None,
                };
                match advance(record, phase, outcome, policy, Utc::now()) {
                    Ok(next) => {
                        log_transition(ctx, phase, record, &next, duration_ms, policy);
                        next
                    }
                    Err(e) => {
                        error!("{} ❌ 非法迁移: {}", ctx, e);
                        state_machine::fail(record, phase, e.to_string(), Utc::now())
                    }
                }
            }
        };

        let still_eligible = match next.state.next_phase() {
            Some(next_phase) => !policy.exhausted(next.attempts_for(next_phase)),
            None => false,
        };

        checkpoint.questions.insert(ctx.question_id.clone(), next);
        self.store.save(checkpoint).await?;
        Ok(still_eligible)
    }
}

/// 在工作线程中执行一次阶段调用（含重试退避）
async fn run_phase(
    flow: Arc<PhaseFlow>,
    phase: Phase,
    record: QuestionRecord,
    question: Option<Arc<BenchmarkQuestion>>,
    ctx: QuestionCtx,
    cancel: CancellationToken,
) -> TaskResult {
    let delay = flow.backoff(record.attempts_for(phase));
    if !delay.is_zero() {
        debug!("{} 等待 {}ms 后重试 {} 阶段", ctx, delay.as_millis(), phase);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return TaskResult::Cancelled,
        }
    }

    let call = flow.execute(phase, &record, question.as_deref(), &ctx);

    // 轮询索引可能持续很久，取消时直接放弃；其余调用由自身超时兜底
    let outcome = if phase == Phase::Index {
        tokio::select! {
            outcome = call => outcome,
            _ = cancel.cancelled() => return TaskResult::Cancelled,
        }
    } else {
        call.await
    };

    TaskResult::Finished(outcome)
}

fn log_transition(
    ctx: &QuestionCtx,
    phase: Phase,
    before: &QuestionRecord,
    after: &QuestionRecord,
    duration_ms: Option<u64>,
    policy: &RetryPolicy,
) {
    let reason = after.last_error.as_deref().unwrap_or_default();
    if after.state.is_failed() {
        error!(
            "{} ❌ 在 {} 阶段失败: {}",
            ctx,
            phase,
            truncate_text(reason, 200)
        );
    } else if after.state == before.state {
        warn!(
            "{} ⚠️ {} 阶段失败 (第 {}/{} 次)，稍后重试: {}",
            ctx,
            phase,
            after.attempts_for(phase),
            policy.max_attempts,
            truncate_text(reason, 200)
        );
    } else {
        info!(
            "{} ✓ {} 完成 → {} ({}ms)",
            ctx,
            phase,
            after.state,
            duration_ms.unwrap_or(0)
        );
    }
}

fn index_questions(questions: Vec<BenchmarkQuestion>) -> QuestionIndex {
    questions
        .into_iter()
        .map(|q| (q.question_id.clone(), Arc::new(q)))
        .collect()
}

async fn initialize(provider: &dyn Provider, run: &Run) -> BenchResult<()> {
    provider
        .initialize(&run.config)
        .await
        .map_err(|e| BenchError::ProviderUnavailable {
            provider: provider.name().to_string(),
            reason: e.to_string(),
        })
}

/// 按 checkpoint 中记录的 containerTag 逐个清理，"已不存在"视为成功
pub async fn cleanup_run(
    store: &dyn CheckpointStore,
    provider: &dyn Provider,
    run_id: &str,
) -> BenchResult<CleanupSummary> {
    let checkpoint = store
        .load(run_id)
        .await?
        .ok_or_else(|| BenchError::RunNotFound(run_id.to_string()))?;
    initialize(provider, &checkpoint.run).await?;

    let tags = checkpoint.container_tags();
    info!("🧹 清理运行 {} 的 {} 个 containerTag", run_id, tags.len());

    let results: Vec<(String, PhaseResult<()>)> = stream::iter(tags)
        .map(|tag| async move {
            let result = provider.clear(&tag).await;
            (tag, result)
        })
        .buffer_unordered(checkpoint.run.config.concurrency.max(1))
        .collect()
        .await;

    let mut summary = CleanupSummary::default();
    for (tag, result) in results {
        match result {
            Ok(()) => summary.cleared += 1,
            Err(PhaseError::NotFound(_)) => summary.already_cleared += 1,
            Err(e) => {
                warn!("⚠️ 清理 {} 失败: {}", tag, e);
                summary.failed.push((tag, e.to_string()));
            }
        }
    }
    summary.failed.sort();

    info!(
        "✓ 清理完成: 成功 {}，已不存在 {}，失败 {}",
        summary.cleared,
        summary.already_cleared,
        summary.failed.len()
    );

    Ok(summary)
}
