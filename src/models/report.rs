use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Phase;

/// 延迟统计（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: u64,
    pub p95: u64,
    pub p99: u64,
}

/// 按题型统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStats {
    pub total: usize,
    /// 到达 Evaluated 的数量（准确率分母）
    pub evaluated: usize,
    pub correct: usize,
    pub failed: usize,
    pub accuracy: f64,
}

/// 按阶段统计成功/失败
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// 失败题目明细
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    pub question_id: String,
    pub question_type: String,
    pub phase: Phase,
    pub reason: String,
}

/// 总体统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub reported: usize,
    pub evaluated: usize,
    pub correct: usize,
    pub failed: usize,
    /// 尚未进入终止状态的题目（运行被中断时非零）
    pub in_progress: usize,
    pub accuracy: f64,
}

/// 运行报告：由 checkpoint 推导，不属于运行状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id: String,
    pub provider: String,
    pub benchmark: String,
    pub judge: String,
    pub summary: ReportSummary,
    pub by_type: BTreeMap<String, TypeStats>,
    pub by_phase: BTreeMap<Phase, PhaseStats>,
    /// 每个阶段及 "total" 的延迟统计
    pub latency: BTreeMap<String, LatencyStats>,
    pub failures: Vec<FailureEntry>,
}

impl Report {
    /// 准确率百分比，保留一位小数
    pub fn accuracy_percent(&self) -> String {
        format!("{:.1}%", self.summary.accuracy * 100.0)
    }
}
