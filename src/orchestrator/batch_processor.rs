//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：校验配置、打开 checkpoint 存储
//! 2. **依赖组装**：按名称从注册表解析 Provider / Judge / Benchmark
//! 3. **命令执行**：run / status / report / list / cleanup / delete
//! 4. **结果输出**：写 `report.json`、打印统计
//!
//! 不处理单道题的细节，全部委托给 `pipeline_runner`。

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::store::validate_run_id;
use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::Config;
use crate::error::BenchError;
use crate::models::{Checkpoint, Report, Run};
use crate::orchestrator::pipeline_runner::{
    cleanup_run, CleanupSummary, Orchestrator, PipelineOutcome, RunOptions,
};
use crate::report::{aggregate, print_report, write_report};
use crate::services::registry;

/// `run` 命令参数
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub provider: String,
    /// 数据集格式（注册表中的 Benchmark 名称）
    pub benchmark: String,
    pub dataset: PathBuf,
    pub judge: String,
    pub run_id: Option<String>,
    pub resume: bool,
    pub limit: Option<usize>,
}

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<FileCheckpointStore>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        log_startup(&config);

        let store = Arc::new(FileCheckpointStore::new(config.runs_dir()));
        Ok(Self { config, store })
    }

    /// 运行或恢复一次基准测试
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> Result<PipelineOutcome> {
        let run_id = request.run_id.clone().unwrap_or_else(Run::generate_id);
        validate_run_id(&run_id)?;

        let existing = if request.resume {
            self.store.load(&run_id).await?
        } else {
            if self.store.exists(&run_id).await? {
                warn!("⚠️ 未启用恢复，将覆盖已有的运行 {}", run_id);
            }
            None
        };

        if let Some(checkpoint) = existing.as_ref().filter(|cp| cp.is_complete()) {
            // 所有题目都已结束，不需要 Provider 和 LLM
            info!("✅ 运行 {} 的所有题目都已结束，直接生成报告", run_id);
            let outcome = PipelineOutcome {
                report: aggregate(checkpoint),
                checkpoint: checkpoint.clone(),
                resumed: true,
                cancelled: false,
            };
            self.finish(&run_id, &outcome).await?;
            return Ok(outcome);
        }

        let plan = RunPlan::resolve(&self.config, &run_id, &request, existing.as_ref());

        let provider = registry::provider(&plan.run.provider, &plan.config)?;
        let judge = registry::judge(&plan.run.judge, &plan.config)?;
        let answerer = registry::answerer(&plan.config)?;
        let benchmark = registry::benchmark(&plan.run.benchmark, &request.dataset)?;
        let run = plan.run;

        let orchestrator = Orchestrator::new(self.store.clone(), provider, answerer, judge, benchmark);
        let options = RunOptions {
            resume: request.resume,
            limit: request.limit,
        };
        let outcome = orchestrator.run_pipeline(run, options, cancel).await?;
        self.finish(&run_id, &outcome).await?;

        Ok(outcome)
    }

    async fn finish(&self, run_id: &str, outcome: &PipelineOutcome) -> Result<()> {
        if outcome.cancelled {
            warn!("⏹️ 运行 {} 已中断，使用相同的 --run-id 继续", run_id);
        } else {
            let path = write_report(&self.store.run_dir(run_id), &outcome.report).await?;
            info!("\n报告已保存至: {}", path.display());
        }
        print_report(&outcome.report);
        Ok(())
    }

    /// 打印各状态的题目数量，不执行任何阶段
    pub async fn status(&self, run_id: &str) -> Result<Checkpoint> {
        let checkpoint = self.load(run_id).await?;

        info!("{}", "=".repeat(60));
        info!("📋 运行 {} ({})", run_id, checkpoint.run.created_at.format("%Y-%m-%d %H:%M:%S"));
        info!(
            "Provider: {} | Benchmark: {} | Judge: {}",
            checkpoint.run.provider, checkpoint.run.benchmark, checkpoint.run.judge
        );
        info!("{}", "─".repeat(60));
        for (state, count) in checkpoint.state_counts() {
            info!("  {:<10} {}", state, count);
        }
        info!("{}", "─".repeat(60));
        if checkpoint.is_complete() {
            info!("✅ 所有 {} 道题都已结束", checkpoint.questions.len());
        } else {
            info!("⏳ 仍有题目未完成，可使用 run --run-id {} 继续", run_id);
        }
        info!("{}", "=".repeat(60));

        Ok(checkpoint)
    }

    /// 重新生成报告
    pub async fn report(&self, run_id: &str) -> Result<Report> {
        let checkpoint = self.load(run_id).await?;
        let report = aggregate(&checkpoint);

        let path = write_report(&self.store.run_dir(run_id), &report).await?;
        print_report(&report);
        info!("\n报告已保存至: {}", path.display());

        Ok(report)
    }

    /// 列出所有运行
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut run_ids = self.store.list_runs().await?;
        run_ids.sort();

        if run_ids.is_empty() {
            info!("没有找到任何运行 ({})", self.store.root().display());
            return Ok(run_ids);
        }

        info!("📁 共 {} 个运行:", run_ids.len());
        for run_id in &run_ids {
            match self.store.load(run_id).await {
                Ok(Some(checkpoint)) => {
                    let counts = checkpoint.state_counts();
                    info!(
                        "  {}  provider={} benchmark={}  reported={} failed={} total={}",
                        run_id,
                        checkpoint.run.provider,
                        checkpoint.run.benchmark,
                        counts.get("reported").copied().unwrap_or(0),
                        counts.get("failed").copied().unwrap_or(0),
                        checkpoint.questions.len()
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("  {}  ⚠️ {}", run_id, e),
            }
        }

        Ok(run_ids)
    }

    /// 清除 Provider 侧数据
    pub async fn cleanup(&self, run_id: &str) -> Result<CleanupSummary> {
        let checkpoint = self.load(run_id).await?;
        let config = self.config.with_snapshot(&checkpoint.run.config);
        let provider = registry::provider(&checkpoint.run.provider, &config)?;

        let summary = cleanup_run(self.store.as_ref(), provider.as_ref(), run_id).await?;
        if !summary.is_success() {
            bail!("{} 个 containerTag 清理失败", summary.failed.len());
        }
        Ok(summary)
    }

    /// 删除 checkpoint（不影响 Provider 侧数据）
    pub async fn delete(&self, run_id: &str) -> Result<()> {
        validate_run_id(run_id)?;
        if !self.store.exists(run_id).await? {
            warn!("⚠️ 运行 {} 不存在", run_id);
        }
        self.store.delete(run_id).await?;
        info!("🗑️ 已删除运行 {}", run_id);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Checkpoint> {
        validate_run_id(run_id)?;
        match self.store.load(run_id).await? {
            Some(checkpoint) => Ok(checkpoint),
            None => Err(BenchError::RunNotFound(run_id.to_string()).into()),
        }
    }
}

// ========== 运行参数解析 ==========

/// 一次运行实际使用的元数据和配置
#[derive(Debug)]
struct RunPlan {
    run: Run,
    config: Config,
}

impl RunPlan {
    /// 新运行以命令行和当前配置为准；
    /// 恢复时 Provider / Benchmark / Judge 和运行参数（包括模型）都以 checkpoint 为准
    fn resolve(config: &Config, run_id: &str, request: &RunRequest, existing: Option<&Checkpoint>) -> Self {
        match existing {
            Some(checkpoint) => {
                let run = &checkpoint.run;
                if run.provider != request.provider
                    || run.judge != request.judge
                    || run.benchmark != request.benchmark
                {
                    warn!(
                        "⚠️ 运行 {} 使用 Provider={} Benchmark={} Judge={} 创建，忽略命令行中的设置",
                        run_id, run.provider, run.benchmark, run.judge
                    );
                }
                if run.config.answer_model != config.answer_model || run.config.judge_model != config.judge_model {
                    warn!(
                        "⚠️ 运行 {} 使用 answer_model={} judge_model={} 创建，忽略当前配置",
                        run_id, run.config.answer_model, run.config.judge_model
                    );
                }
                Self {
                    run: run.clone(),
                    config: config.with_snapshot(&run.config),
                }
            }
            None => Self {
                run: Run::new(
                    run_id,
                    request.provider.clone(),
                    request.benchmark.clone(),
                    request.judge.clone(),
                    config.snapshot(),
                ),
                config: config.clone(),
            },
        }
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 memory-bench 启动");
    info!("📁 数据目录: {}", config.data_dir.display());
    info!("📊 最大并发数: {}", config.concurrency);
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkQuestion, RunConfigSnapshot};
    use crate::report::writer::REPORT_FILE;
    use crate::services::Generator;

    fn request(run_id: &str) -> RunRequest {
        RunRequest {
            provider: "local".to_string(),
            benchmark: "longmemeval".to_string(),
            dataset: PathBuf::from("missing.json"),
            judge: "openai".to_string(),
            run_id: Some(run_id.to_string()),
            resume: true,
            limit: None,
        }
    }

    fn recorded_snapshot() -> RunConfigSnapshot {
        RunConfigSnapshot {
            answer_model: "recorded-answer".to_string(),
            judge_model: "recorded-judge".to_string(),
            ..RunConfigSnapshot::default()
        }
    }

    fn question(id: &str) -> BenchmarkQuestion {
        BenchmarkQuestion {
            question_id: id.to_string(),
            question_type: "t".to_string(),
            question: "?".to_string(),
            answer: "!".to_string(),
            question_date: None,
            sessions: Vec::new(),
        }
    }

    fn app(dir: &std::path::Path) -> App {
        let config = Config {
            data_dir: dir.to_path_buf(),
            llm_api_key: String::new(),
            ..Config::default()
        };
        App::initialize(config).unwrap()
    }

    #[test]
    fn test_resume_uses_recorded_models_and_benchmark() {
        let config = Config {
            llm_api_key: "sk-test".to_string(),
            answer_model: "current-answer".to_string(),
            judge_model: "current-judge".to_string(),
            ..Config::default()
        };
        let run = Run::new("r1", "local", "custom", "openai", recorded_snapshot());
        let checkpoint = Checkpoint::new(run, &[question("a")]).unwrap();

        let plan = RunPlan::resolve(&config, "r1", &request("r1"), Some(&checkpoint));
        assert_eq!(plan.run, checkpoint.run);
        assert_eq!(plan.run.benchmark, "custom");
        assert_eq!(plan.config.answer_model, "recorded-answer");

        let answerer = registry::answerer(&plan.config).unwrap();
        let judge = registry::judge(&plan.run.judge, &plan.config).unwrap();
        assert_eq!(answerer.model(), "recorded-answer");
        assert_eq!(judge.model(), "recorded-judge");
    }

    #[test]
    fn test_new_run_uses_current_config() {
        let config = Config {
            answer_model: "current-answer".to_string(),
            ..Config::default()
        };
        let plan = RunPlan::resolve(&config, "r2", &request("r2"), None);
        assert_eq!(plan.run.benchmark, "longmemeval");
        assert_eq!(plan.run.config.answer_model, "current-answer");
        assert_eq!(plan.config, config);
    }

    #[tokio::test]
    async fn test_finished_run_resumes_without_llm_key() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        // Provider 名称已不在注册表中，也不影响重新出报告
        let run = Run::new("done", "retired-provider", "custom", "openai", recorded_snapshot());
        app.store.save(&Checkpoint::new(run, &[]).unwrap()).await.unwrap();

        let outcome = app.run(request("done"), CancellationToken::new()).await.unwrap();
        assert!(outcome.resumed);
        assert!(!outcome.cancelled);
        assert!(app.store.run_dir("done").join(REPORT_FILE).is_file());
    }

    #[tokio::test]
    async fn test_unfinished_run_still_needs_llm_key() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let run = Run::new("open", "local", "custom", "openai", recorded_snapshot());
        app.store.save(&Checkpoint::new(run, &[question("a")]).unwrap()).await.unwrap();

        let err = app.run(request("open"), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BenchError>(), Some(BenchError::Config(_))));
    }
}
