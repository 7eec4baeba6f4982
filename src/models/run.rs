use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 运行开始时固化的配置快照
///
/// 恢复运行时始终使用快照中的值，而不是当前的环境配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfigSnapshot {
    /// 同时在途的阶段调用数量（K）
    pub concurrency: usize,
    /// 每个阶段的最大尝试次数
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub phase_timeout_secs: u64,
    pub indexing_poll_interval_ms: u64,
    pub indexing_timeout_secs: u64,
    pub search_limit: usize,
    /// containerTag 模板，支持 `{questionId}` 和 `{runId}`
    pub container_tag_template: String,
    pub answer_model: String,
    pub judge_model: String,
}

impl Default for RunConfigSnapshot {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            phase_timeout_secs: 120,
            indexing_poll_interval_ms: 2000,
            indexing_timeout_secs: 300,
            search_limit: 10,
            container_tag_template: crate::pipeline::container_tag::DEFAULT_TEMPLATE.to_string(),
            answer_model: "gpt-4o-mini".to_string(),
            judge_model: "gpt-4o".to_string(),
        }
    }
}

/// 一次基准测试运行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Run {
    pub run_id: String,
    pub provider: String,
    pub benchmark: String,
    pub judge: String,
    pub created_at: DateTime<Utc>,
    pub config: RunConfigSnapshot,
}

impl Run {
    pub fn new(
        run_id: impl Into<String>,
        provider: impl Into<String>,
        benchmark: impl Into<String>,
        judge: impl Into<String>,
        config: RunConfigSnapshot,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            provider: provider.into(),
            benchmark: benchmark.into(),
            judge: judge.into(),
            created_at: Utc::now(),
            config,
        }
    }

    /// 生成默认的运行ID: `run-<yyyymmdd-hhmmss>-<8位十六进制>`
    pub fn generate_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "run-{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            &suffix[..8]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = Run::generate_id();
        assert!(id.starts_with("run-"));
        // run- + 15 位时间戳 + - + 8 位
        assert_eq!(id.len(), 4 + 15 + 1 + 8);
        assert_ne!(id, Run::generate_id());
    }

    #[test]
    fn test_snapshot_fills_missing_fields() {
        let snapshot: RunConfigSnapshot = serde_json::from_str(r#"{"concurrency": 8}"#).unwrap();
        assert_eq!(snapshot.concurrency, 8);
        assert_eq!(snapshot.max_attempts, 3);
    }
}
