use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, BenchResult};
use crate::models::RunConfigSnapshot;
use crate::pipeline::container_tag;

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "MEMORYBENCH_CONFIG";

/// 程序配置
///
/// 优先级：环境变量 > 配置文件 > 默认值。
/// 运行开始时会固化为 `RunConfigSnapshot`，恢复运行只使用快照。
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据目录，checkpoint 与报告位于 `<data_dir>/runs/<runId>/`
    pub data_dir: PathBuf,
    /// 同时在途的阶段调用数量
    pub concurrency: usize,
    /// 每个阶段的最大尝试次数
    pub max_attempts: u32,
    /// 重试退避基数（毫秒），第 n 次重试等待 `base * 2^(n-1)`
    pub retry_backoff_ms: u64,
    /// 单次外部调用超时（秒）
    pub phase_timeout_secs: u64,
    pub indexing_poll_interval_ms: u64,
    pub indexing_timeout_secs: u64,
    /// 每道题检索的结果数量上限
    pub search_limit: usize,
    pub container_tag_template: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub answer_model: String,
    pub judge_model: String,
}

impl Default for Config {
    fn default() -> Self {
        let snapshot = RunConfigSnapshot::default();
        Self {
            data_dir: PathBuf::from("data"),
            concurrency: snapshot.concurrency,
            max_attempts: snapshot.max_attempts,
            retry_backoff_ms: snapshot.retry_backoff_ms,
            phase_timeout_secs: snapshot.phase_timeout_secs,
            indexing_poll_interval_ms: snapshot.indexing_poll_interval_ms,
            indexing_timeout_secs: snapshot.indexing_timeout_secs,
            search_limit: snapshot.search_limit,
            container_tag_template: snapshot.container_tag_template,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            answer_model: snapshot.answer_model,
            judge_model: snapshot.judge_model,
        }
    }
}

impl Config {
    /// 默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 加载配置：显式路径优先，其次 `MEMORYBENCH_CONFIG`，最后只用默认值；
    /// 环境变量总是覆盖文件中的值
    pub fn load(path: Option<&Path>) -> BenchResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let base = match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    BenchError::Config(format!("无法读取配置文件 {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 解析 TOML，缺失字段使用默认值
    pub fn from_toml_str(content: &str) -> BenchResult<Self> {
        toml::from_str(content).map_err(|e| BenchError::Config(format!("配置文件格式错误: {}", e)))
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            data_dir: std::env::var("MEMORYBENCH_DATA_DIR").map(PathBuf::from).unwrap_or(default.data_dir),
            concurrency: std::env::var("CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.concurrency),
            max_attempts: std::env::var("MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_attempts),
            retry_backoff_ms: std::env::var("RETRY_BACKOFF_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_backoff_ms),
            phase_timeout_secs: std::env::var("PHASE_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.phase_timeout_secs),
            indexing_poll_interval_ms: std::env::var("INDEXING_POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.indexing_poll_interval_ms),
            indexing_timeout_secs: std::env::var("INDEXING_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.indexing_timeout_secs),
            search_limit: std::env::var("SEARCH_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.search_limit),
            container_tag_template: std::env::var("CONTAINER_TAG_TEMPLATE").unwrap_or(default.container_tag_template),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            answer_model: std::env::var("ANSWER_MODEL").unwrap_or(default.answer_model),
            judge_model: std::env::var("JUDGE_MODEL").unwrap_or(default.judge_model),
        }
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.concurrency == 0 {
            return Err(BenchError::Config("concurrency 必须大于 0".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(BenchError::Config("max_attempts 必须大于 0".to_string()));
        }
        if self.search_limit == 0 {
            return Err(BenchError::Config("search_limit 必须大于 0".to_string()));
        }
        // 超时为 0 会让每次调用立即超时，轮询间隔为 0 会空转
        if self.phase_timeout_secs == 0 {
            return Err(BenchError::Config("phase_timeout_secs 必须大于 0".to_string()));
        }
        if self.indexing_timeout_secs == 0 {
            return Err(BenchError::Config("indexing_timeout_secs 必须大于 0".to_string()));
        }
        if self.indexing_poll_interval_ms == 0 {
            return Err(BenchError::Config("indexing_poll_interval_ms 必须大于 0".to_string()));
        }
        container_tag::validate_template(&self.container_tag_template)
    }

    /// 所有运行的 checkpoint 根目录
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    /// 用已固化的运行参数覆盖当前配置，数据目录和 LLM 连接信息保持不变
    pub fn with_snapshot(&self, snapshot: &RunConfigSnapshot) -> Self {
        Self {
            concurrency: snapshot.concurrency,
            max_attempts: snapshot.max_attempts,
            retry_backoff_ms: snapshot.retry_backoff_ms,
            phase_timeout_secs: snapshot.phase_timeout_secs,
            indexing_poll_interval_ms: snapshot.indexing_poll_interval_ms,
            indexing_timeout_secs: snapshot.indexing_timeout_secs,
            search_limit: snapshot.search_limit,
            container_tag_template: snapshot.container_tag_template.clone(),
            answer_model: snapshot.answer_model.clone(),
            judge_model: snapshot.judge_model.clone(),
            ..self.clone()
        }
    }

    /// 固化运行配置
    pub fn snapshot(&self) -> RunConfigSnapshot {
        RunConfigSnapshot {
            concurrency: self.concurrency,
            max_attempts: self.max_attempts,
            retry_backoff_ms: self.retry_backoff_ms,
            phase_timeout_secs: self.phase_timeout_secs,
            indexing_poll_interval_ms: self.indexing_poll_interval_ms,
            indexing_timeout_secs: self.indexing_timeout_secs,
            search_limit: self.search_limit,
            container_tag_template: self.container_tag_template.clone(),
            answer_model: self.answer_model.clone(),
            judge_model: self.judge_model.clone(),
        }
    }
}
