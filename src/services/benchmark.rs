//! Benchmark 数据源 - 业务能力层
//!
//! 只读地提供题目与历史会话，编排层不关心文件格式。

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::BenchResult;
use crate::models::{load_questions, BenchmarkQuestion, DatasetFormat};

/// Benchmark 数据源
#[async_trait]
pub trait Benchmark: Send + Sync {
    /// 注册名称，写入 `Run.benchmark`
    fn name(&self) -> &str;

    /// 加载全部题目（按数据集中的顺序）
    async fn load(&self) -> BenchResult<Vec<BenchmarkQuestion>>;
}

/// 基于 JSON 文件的数据源
#[derive(Debug, Clone)]
pub struct JsonBenchmark {
    name: String,
    path: PathBuf,
    format: DatasetFormat,
}

impl JsonBenchmark {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, format: DatasetFormat) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Benchmark for JsonBenchmark {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> BenchResult<Vec<BenchmarkQuestion>> {
        load_questions(&self.path, self.format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_benchmark_loads_native_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        tokio::fs::write(
            &path,
            r#"[{"questionId": "q1", "questionType": "single-session-user",
                "question": "我的猫叫什么?", "answer": "Luna",
                "sessions": [{"sessionId": "s1", "messages": [{"role": "user", "content": "我的猫叫 Luna"}]}]}]"#,
        )
        .await
        .unwrap();

        let benchmark = JsonBenchmark::new("custom", &path, DatasetFormat::Native);
        let questions = benchmark.load().await.unwrap();

        assert_eq!(benchmark.name(), "custom");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].sessions[0].session_id, "s1");
    }
}
