//! 流水线核心逻辑（纯函数，无 I/O）
//!
//! - `state_machine` - 阶段状态机
//! - `classifier` - 失败分类
//! - `container_tag` - containerTag 推导

pub mod classifier;
pub mod container_tag;
pub mod state_machine;

pub use classifier::{DefaultClassifier, FailureClass, FailureClassifier};
pub use state_machine::{advance, PhaseOutcome, PhaseOutput, RetryPolicy, TransitionError};
