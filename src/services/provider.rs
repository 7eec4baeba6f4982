//! Provider 能力接口 - 业务能力层
//!
//! 编排层只依赖这里的接口，不认识任何具体 Provider 的协议。
//! 同步/异步索引、按会话或按题分组等差异都留在具体实现内部。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{PhaseError, PhaseResult};
use crate::models::{IngestResult, Phase, RunConfigSnapshot, Session};
use crate::pipeline::{DefaultClassifier, FailureClass, FailureClassifier};

/// 写入参数
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub container_tag: String,
}

/// 检索参数
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub container_tag: String,
    pub limit: usize,
}

/// 轮询参数：轮询间隔 + 总超时
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollOptions {
    pub fn from_snapshot(config: &RunConfigSnapshot) -> Self {
        Self {
            interval: Duration::from_millis(config.indexing_poll_interval_ms),
            timeout: Duration::from_secs(config.indexing_timeout_secs),
        }
    }
}

/// 记忆/上下文 Provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// 注册名称
    fn name(&self) -> &str;

    /// 建立连接、校验凭证；失败时整个运行无法开始
    async fn initialize(&self, config: &RunConfigSnapshot) -> PhaseResult<()>;

    /// 写入一道题的全部历史会话，重复调用必须作用于同一个 containerTag
    async fn ingest(&self, sessions: &[Session], options: &IngestOptions) -> PhaseResult<IngestResult>;

    /// 阻塞直到 Provider 侧索引可用，或以 `IndexingTimeout` 失败
    async fn await_indexing(
        &self,
        ingest_result: &IngestResult,
        container_tag: &str,
        poll: &PollOptions,
    ) -> PhaseResult<()>;

    async fn search(&self, query: &str, options: &SearchOptions) -> PhaseResult<Vec<JsonValue>>;

    /// 删除该 containerTag 下的全部数据；已经清除过也视为成功
    async fn clear(&self, container_tag: &str) -> PhaseResult<()>;

    /// 失败分类，默认使用保守策略，具体 Provider 可覆盖
    fn classify(&self, phase: Phase, error: &PhaseError) -> FailureClass {
        DefaultClassifier.classify(phase, error)
    }
}

/// 回答者与裁判共用的能力：prompt → 文本
#[async_trait]
pub trait Generator: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> PhaseResult<String>;

    fn classify(&self, phase: Phase, error: &PhaseError) -> FailureClass {
        DefaultClassifier.classify(phase, error)
    }
}
