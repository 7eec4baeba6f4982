pub mod checkpoint;
pub mod loaders;
pub mod question;
pub mod record;
pub mod report;
pub mod run;

pub use checkpoint::{Checkpoint, CURRENT_SCHEMA_VERSION};
pub use loaders::{load_questions, DatasetFormat};
pub use question::{BenchmarkQuestion, Message, Session};
pub use record::{Evaluation, IngestResult, Phase, PhaseState, QuestionRecord};
pub use report::{FailureEntry, LatencyStats, PhaseStats, Report, ReportSummary, TypeStats};
pub use run::{Run, RunConfigSnapshot};
