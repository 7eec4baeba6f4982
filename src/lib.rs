//! # Memory Bench
//!
//! 记忆/上下文 Provider 的基准测试流水线
//!
//! ## 架构设计
//!
//! 每道题按固定顺序走完六个阶段：
//! `Ingest → Index → Search → Answer → Evaluate → Report`，
//! 每次阶段迁移后都会原子地保存 checkpoint，进程崩溃后可以无损恢复。
//!
//! ### ① 数据与纯逻辑
//! - `models/` - 运行、题目记录、checkpoint、报告等数据结构
//! - `pipeline/` - 阶段状态机、失败分类、containerTag 推导（无 I/O）
//!
//! ### ② 持久化
//! - `checkpoint/` - checkpoint 存储（文件 / 内存）与 schema 升级
//!
//! ### ③ 业务能力层（Services）
//! - `Provider` - 记忆写入、索引、检索、清理能力
//! - `Generator` - 回答者与裁判的 prompt → 文本能力
//! - `Benchmark` - 只读数据集
//! - `registry` - 名称 → 构造函数的静态映射
//!
//! ### ④ 流程层（Workflow）
//! - `PhaseFlow` - 把题目的当前状态映射为一次外部调用
//! - `QuestionCtx` - 日志上下文
//!
//! ### ⑤ 编排层（Orchestration）
//! - `scheduler` - 有界的连续准入
//! - `pipeline_runner` - 调度循环、持久化顺序、取消与清理
//! - `batch_processor` - CLI 命令入口
//!
//! ### ⑥ 报告
//! - `report/` - 从 checkpoint 推导准确率与延迟统计
//!
//! ## 模块结构

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::Config;
pub use error::{BenchError, BenchResult, PhaseError, PhaseResult};
pub use models::{BenchmarkQuestion, Checkpoint, Phase, PhaseState, QuestionRecord, Report, Run, RunConfigSnapshot};
pub use orchestrator::{App, Orchestrator, PipelineOutcome, RunOptions};
pub use pipeline::{DefaultClassifier, FailureClass, FailureClassifier};
pub use services::{Benchmark, Generator, Provider};
pub use workflow::{PhaseFlow, QuestionCtx};
