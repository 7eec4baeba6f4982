/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::Run;

/// 初始化全局日志
///
/// `RUST_LOG` 优先；未设置时默认 `info`，`verbose` 为真时默认 `debug`。
/// 重复调用不会报错（测试中会多次初始化）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录运行启动信息
///
/// # 参数
/// - `run`: 运行元数据
/// - `total`: 题目总数
/// - `resumed`: 是否从已有 checkpoint 恢复
pub fn log_run_start(run: &Run, total: usize, resumed: bool) {
    info!("{}", "=".repeat(60));
    if resumed {
        info!("🔄 恢复运行: {}", run.run_id);
    } else {
        info!("🚀 开始运行: {}", run.run_id);
    }
    info!(
        "📦 Provider: {} | Benchmark: {} | Judge: {}",
        run.provider, run.benchmark, run.judge
    );
    info!(
        "📊 题目数: {} | 并发数: {} | 最大尝试次数: {}",
        total, run.config.concurrency, run.config.max_attempts
    );
    info!("{}", "=".repeat(60));
}

/// 记录调度结果
///
/// # 参数
/// - `eligible`: 需要继续推进的题目数
/// - `total`: 题目总数
pub fn log_work_remaining(eligible: usize, total: usize) {
    if eligible == 0 {
        info!("✓ 所有题目都已处于终止状态，无需执行任何阶段");
    } else {
        info!("📋 {} / {} 道题需要继续推进", eligible, total);
    }
}

/// 记录运行中断信息
pub fn log_cancelled(in_flight: usize) {
    info!("\n{}", "─".repeat(60));
    info!("⏹️ 收到取消信号，停止调度新的阶段调用");
    info!("⏳ 等待 {} 个在途调用结束后保存进度", in_flight);
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("你好世界", 2), "你好...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_init_can_be_called_twice() {
        init(false);
        init(true);
    }
}
