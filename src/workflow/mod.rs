pub mod phase_flow;
pub mod question_ctx;

pub use phase_flow::PhaseFlow;
pub use question_ctx::QuestionCtx;
