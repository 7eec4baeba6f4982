//! 错误类型
//!
//! 两层错误：
//! - `PhaseError`：单次阶段调用（Provider / Judge / Answerer）的失败，
//!   永远不会逃出编排层，只会被转换成状态机迁移
//! - `BenchError`：运行级错误（存储、初始化、配置），会向上传播并终止运行

use thiserror::Error;

/// 单次阶段调用错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// 调用超时
    #[error("调用超时: {operation} (超过 {timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    /// 请求频率限制
    #[error("请求频率限制, 建议等待: {retry_after_secs:?}秒")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 服务端返回 HTTP 错误状态
    #[error("服务端错误 (status={status}): {message}")]
    Server { status: u16, message: String },

    /// 等待索引完成超时
    #[error("索引超时: containerTag={container_tag}, 已等待 {waited_ms}ms")]
    IndexingTimeout { container_tag: String, waited_ms: u64 },

    /// 输入数据不合法
    #[error("输入不合法: {0}")]
    MalformedInput(String),

    /// 认证失败
    #[error("认证失败: {0}")]
    Unauthorized(String),

    /// 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 返回内容无法解析
    #[error("响应无法解析: {0}")]
    MalformedResponse(String),

    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

impl PhaseError {
    /// 创建超时错误
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        PhaseError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// 创建服务端错误
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        PhaseError::Server {
            status,
            message: message.into(),
        }
    }
}

/// 运行级错误
#[derive(Debug, Error)]
pub enum BenchError {
    /// Checkpoint 已损坏，无法自动恢复
    #[error("Checkpoint 已损坏 (run: {run_id}): {reason}")]
    CheckpointCorrupt { run_id: String, reason: String },

    /// Checkpoint 存储读写失败
    #[error("Checkpoint 存储失败 ({path}): {source}")]
    Store {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Provider 初始化失败（整个运行无法开始）
    #[error("Provider 不可用 ({provider}): {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// 未注册的 Provider 名称
    #[error("未知的 Provider: {0}")]
    UnknownProvider(String),

    /// 未注册的 Judge 名称
    #[error("未知的 Judge: {0}")]
    UnknownJudge(String),

    /// 未注册的 Benchmark 名称
    #[error("未知的 Benchmark: {0}")]
    UnknownBenchmark(String),

    /// 数据集加载失败
    #[error("数据集加载失败 ({path}): {reason}")]
    Dataset { path: String, reason: String },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 运行不存在
    #[error("运行不存在: {0}")]
    RunNotFound(String),
}

// ========== 便捷构造函数 ==========

impl BenchError {
    /// 创建 Checkpoint 损坏错误
    pub fn corrupt(run_id: impl Into<String>, reason: impl Into<String>) -> Self {
        BenchError::CheckpointCorrupt {
            run_id: run_id.into(),
            reason: reason.into(),
        }
    }

    /// 创建存储 IO 错误
    pub fn store(path: impl Into<String>, source: std::io::Error) -> Self {
        BenchError::Store {
            path: path.into(),
            source,
        }
    }

    /// 创建数据集错误
    pub fn dataset(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        BenchError::Dataset {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 运行级结果类型
pub type BenchResult<T> = Result<T, BenchError>;

/// 阶段调用结果类型
pub type PhaseResult<T> = Result<T, PhaseError>;
