//! Checkpoint 存储层
//!
//! - `store` - 存储能力（文件 / 内存）
//! - `migration` - 编解码与 schema 升级

pub mod migration;
pub mod store;

pub use store::{atomic_write, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
