//! 本地 Provider - 业务能力层
//!
//! 进程内的记忆存储，每段会话作为一个文档，按词重叠打分检索。
//! 不需要任何外部服务，用于演示与冒烟测试。
//!
//! 可以通过 `index_delay` 模拟异步索引：写入后的文档要过一段时间才可检索，
//! `await_indexing` 通过 `indexing::poll_until` 轮询任务状态。

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{PhaseError, PhaseResult};
use crate::models::{IngestResult, Phase, RunConfigSnapshot, Session};
use crate::pipeline::{DefaultClassifier, FailureClass, FailureClassifier};
use crate::services::indexing::poll_until;
use crate::services::provider::{IngestOptions, PollOptions, Provider, SearchOptions};

#[derive(Debug, Clone)]
struct Document {
    id: String,
    session_id: String,
    date: Option<String>,
    content: String,
    tokens: HashSet<String>,
    ready_at: Instant,
}

/// 本地 Provider
pub struct LocalProvider {
    containers: Mutex<HashMap<String, Vec<Document>>>,
    index_delay: Duration,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::with_index_delay(Duration::ZERO)
    }

    /// 写入后需要等待 `delay` 才能检索到
    pub fn with_index_delay(delay: Duration) -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            index_delay: delay,
        }
    }

    /// 当前保存的 containerTag 数量
    pub fn container_count(&self) -> usize {
        self.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn lock(&self) -> PhaseResult<std::sync::MutexGuard<'_, HashMap<String, Vec<Document>>>> {
        self.containers
            .lock()
            .map_err(|_| PhaseError::Other("本地存储锁已损坏".to_string()))
    }

    /// 指定任务是否都已完成索引
    fn tasks_ready(&self, container_tag: &str, task_ids: &[String]) -> PhaseResult<bool> {
        let containers = self.lock()?;
        let docs = containers
            .get(container_tag)
            .ok_or_else(|| PhaseError::NotFound(format!("containerTag 不存在: {}", container_tag)))?;

        let now = Instant::now();
        for task_id in task_ids {
            let doc = docs
                .iter()
                .find(|d| &d.id == task_id)
                .ok_or_else(|| PhaseError::NotFound(format!("索引任务不存在: {}", task_id)))?;
            if doc.ready_at > now {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// 简单分词：小写、按非字母数字切分；CJK 字符逐字成词
fn tokenize(text: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            current.extend(c.to_lowercase());
            continue;
        }
        if !current.is_empty() {
            tokens.insert(std::mem::take(&mut current));
        }
        if c.is_alphanumeric() {
            tokens.insert(c.to_string());
        }
    }
    if !current.is_empty() {
        tokens.insert(current);
    }

    tokens
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn initialize(&self, _config: &RunConfigSnapshot) -> PhaseResult<()> {
        info!("本地 Provider 已就绪 (索引延迟: {:?})", self.index_delay);
        Ok(())
    }

    async fn ingest(&self, sessions: &[Session], options: &IngestOptions) -> PhaseResult<IngestResult> {
        if sessions.is_empty() {
            return Err(PhaseError::MalformedInput("没有可写入的会话".to_string()));
        }

        let ready_at = Instant::now() + self.index_delay;
        let mut containers = self.lock()?;
        let docs = containers.entry(options.container_tag.clone()).or_default();

        let mut document_ids = Vec::with_capacity(sessions.len());
        for session in sessions {
            let id = format!("{}-{}", options.container_tag, session.session_id);
            let content = session.to_transcript();
            let doc = Document {
                id: id.clone(),
                session_id: session.session_id.clone(),
                date: session.date.clone(),
                tokens: tokenize(&content),
                content,
                ready_at,
            };

            // 重复写入同一会话时覆盖，避免重试产生重复文档
            match docs.iter_mut().find(|d| d.id == id) {
                Some(existing) => *existing = doc,
                None => docs.push(doc),
            }
            document_ids.push(id);
        }

        debug!(
            "[{}] 写入 {} 段会话",
            options.container_tag,
            document_ids.len()
        );

        let task_ids = if self.index_delay.is_zero() {
            Vec::new()
        } else {
            document_ids.clone()
        };

        Ok(IngestResult {
            document_ids,
            task_ids,
        })
    }

    async fn await_indexing(
        &self,
        ingest_result: &IngestResult,
        container_tag: &str,
        poll: &PollOptions,
    ) -> PhaseResult<()> {
        if ingest_result.task_ids.is_empty() {
            return Ok(());
        }

        poll_until(container_tag, poll, || async {
            self.tasks_ready(container_tag, &ingest_result.task_ids)
        })
        .await
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> PhaseResult<Vec<JsonValue>> {
        let query_tokens = tokenize(query);
        let containers = self.lock()?;
        let docs = match containers.get(&options.container_tag) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };

        let now = Instant::now();
        let mut scored: Vec<(usize, &Document)> = docs
            .iter()
            .filter(|d| d.ready_at <= now)
            .map(|d| (d.tokens.intersection(&query_tokens).count(), d))
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

        Ok(scored
            .into_iter()
            .take(options.limit)
            .map(|(score, d)| {
                json!({
                    "id": d.id,
                    "sessionId": d.session_id,
                    "date": d.date,
                    "content": d.content,
                    "score": score,
                })
            })
            .collect())
    }

    async fn clear(&self, container_tag: &str) -> PhaseResult<()> {
        self.lock()?.remove(container_tag);
        Ok(())
    }

    /// 同步索引时不存在"尚未索引完成"的情况，索引超时说明状态异常
    fn classify(&self, phase: Phase, error: &PhaseError) -> FailureClass {
        match (phase, error) {
            (Phase::Index, PhaseError::IndexingTimeout { .. }) if self.index_delay.is_zero() => {
                FailureClass::Fatal
            }
            _ => DefaultClassifier.classify(phase, error),
        }
    }
}
