//! 报告输出：`report.json` + 控制台统计

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::checkpoint::atomic_write;
use crate::error::BenchResult;
use crate::models::Report;
use crate::utils::truncate_text;

pub const REPORT_FILE: &str = "report.json";

/// 把报告写到运行目录下，返回文件路径
pub async fn write_report(run_dir: &Path, report: &Report) -> BenchResult<PathBuf> {
    let path = run_dir.join(REPORT_FILE);
    let bytes = serde_json::to_vec_pretty(report)?;
    atomic_write(&path, &bytes).await?;
    Ok(path)
}

/// 打印最终统计信息
pub fn print_report(report: &Report) {
    let summary = &report.summary;

    info!("\n{}", "=".repeat(60));
    info!("📊 运行报告: {}", report.run_id);
    info!(
        "Provider: {} | Benchmark: {} | Judge: {}",
        report.provider, report.benchmark, report.judge
    );
    info!("{}", "=".repeat(60));
    info!(
        "✅ 已完成: {}/{} | 已评测: {} | 正确: {}",
        summary.reported, summary.total, summary.evaluated, summary.correct
    );
    info!("🎯 准确率: {}", report.accuracy_percent());
    info!("❌ 失败: {}", summary.failed);
    if summary.in_progress > 0 {
        info!("⏳ 未完成: {}（可以恢复运行继续推进）", summary.in_progress);
    }

    info!("{}", "─".repeat(60));
    for (question_type, stats) in &report.by_type {
        info!(
            "  {:<28} {:>3}/{:<3} 正确率 {:>5.1}%  失败 {}",
            question_type,
            stats.correct,
            stats.evaluated,
            stats.accuracy * 100.0,
            stats.failed
        );
    }

    info!("{}", "─".repeat(60));
    for (phase, stats) in &report.by_phase {
        let latency = report.latency.get(phase.name());
        info!(
            "  {:<10} 成功 {:>4}  失败 {:>3}  p50 {:>6}ms  p95 {:>6}ms",
            phase.name(),
            stats.succeeded,
            stats.failed,
            latency.map(|l| l.median).unwrap_or(0),
            latency.map(|l| l.p95).unwrap_or(0)
        );
    }

    if !report.failures.is_empty() {
        info!("{}", "─".repeat(60));
        for failure in &report.failures {
            warn!(
                "  ❌ {} [{}] 在 {} 阶段失败: {}",
                failure.question_id,
                failure.question_type,
                failure.phase,
                truncate_text(&failure.reason, 100)
            );
        }
    }
    info!("{}", "=".repeat(60));
}
