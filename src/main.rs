use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use memory_bench::orchestrator::{App, RunRequest};
use memory_bench::utils::logging;
use memory_bench::Config;

#[derive(Parser)]
#[command(name = "memory-bench")]
#[command(about = "记忆 Provider 基准测试流水线")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径（TOML，也可通过 MEMORYBENCH_CONFIG 指定）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 显示详细日志
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行或恢复一次基准测试
    Run {
        /// Provider 名称
        #[arg(long, default_value = "local")]
        provider: String,

        /// 数据集文件路径
        #[arg(long)]
        benchmark: PathBuf,

        /// 数据集格式: longmemeval / custom
        #[arg(long, default_value = "longmemeval")]
        format: String,

        /// 裁判名称
        #[arg(long, default_value = "openai")]
        judge: String,

        /// 运行ID（默认自动生成；已存在时恢复）
        #[arg(long)]
        run_id: Option<String>,

        /// 忽略已有的 checkpoint，重新开始
        #[arg(long)]
        no_resume: bool,

        /// 只运行前 N 道题
        #[arg(long)]
        limit: Option<usize>,
    },

    /// 查看运行进度
    Status { run_id: String },

    /// 重新生成报告
    Report { run_id: String },

    /// 列出所有运行
    List,

    /// 清除 Provider 侧数据
    Cleanup { run_id: String },

    /// 删除运行的 checkpoint
    Delete { run_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load(cli.config.as_deref())?;

    // 初始化日志
    logging::init(cli.verbose || config.verbose_logging);

    let app = App::initialize(config)?;

    match cli.command {
        Commands::Run {
            provider,
            benchmark,
            format,
            judge,
            run_id,
            no_resume,
            limit,
        } => {
            let cancel = CancellationToken::new();
            let signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⏹️ 收到 Ctrl-C，正在停止...");
                    signal.cancel();
                }
            });

            let request = RunRequest {
                provider,
                benchmark: format,
                dataset: benchmark,
                judge,
                run_id,
                resume: !no_resume,
                limit,
            };
            app.run(request, cancel).await?;
        }
        Commands::Status { run_id } => {
            app.status(&run_id).await?;
        }
        Commands::Report { run_id } => {
            app.report(&run_id).await?;
        }
        Commands::List => {
            app.list().await?;
        }
        Commands::Cleanup { run_id } => {
            app.cleanup(&run_id).await?;
        }
        Commands::Delete { run_id } => {
            app.delete(&run_id).await?;
        }
    }

    Ok(())
}
