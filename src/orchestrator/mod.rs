//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量调度与运行生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 校验配置、打开存储
//! - 按名称组装 Provider / Judge / Benchmark
//! - 执行 CLI 命令并输出结果
//!
//! ### `pipeline_runner` - 流水线运行器
//! - 创建或恢复 checkpoint
//! - 驱动调度循环，把结果交给状态机并逐次落盘
//! - 处理取消与清理
//!
//! ### `scheduler` - 批量调度器
//! - 计算可推进的题目
//! - 有界的连续准入（最多 K 个在途）
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (命令)
//!     ↓
//! pipeline_runner (Vec<QuestionRecord>)
//!     ↓
//! workflow::PhaseFlow (单道题的一个阶段)
//!     ↓
//! services (能力层：Provider / Generator / Benchmark)
//! ```

pub mod batch_processor;
pub mod pipeline_runner;
pub mod scheduler;

// 重新导出主要类型
pub use batch_processor::{App, RunRequest};
pub use pipeline_runner::{cleanup_run, CleanupSummary, Orchestrator, PipelineOutcome, RunOptions};
pub use scheduler::BatchScheduler;
