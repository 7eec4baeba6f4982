//! 报告层
//!
//! - `aggregator` - 从 checkpoint 推导报告（纯函数）
//! - `writer` - 写入 `report.json` 并打印统计

pub mod aggregator;
pub mod writer;

pub use aggregator::aggregate;
pub use writer::{print_report, write_report};
