//! 题目处理上下文
//!
//! 封装"我正在处理哪次运行的第几题"这一信息

use std::fmt::Display;

/// 题目处理上下文（仅用于日志）
#[derive(Debug, Clone)]
pub struct QuestionCtx {
    pub run_id: String,

    pub question_id: String,

    /// 题目在 checkpoint 中的位置（从1开始）
    pub position: usize,

    pub total: usize,
}

impl QuestionCtx {
    pub fn new(run_id: impl Into<String>, question_id: impl Into<String>, position: usize, total: usize) -> Self {
        Self {
            run_id: run_id.into(),
            question_id: question_id.into(),
            position,
            total,
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[run {} | q {}/{} {}]",
            self.run_id, self.position, self.total, self.question_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefix() {
        let ctx = QuestionCtx::new("run-1", "q7", 3, 10);
        assert_eq!(ctx.to_string(), "[run run-1 | q 3/10 q7]");
    }
}
