pub mod benchmark;
pub mod indexing;
pub mod llm_service;
pub mod local_provider;
pub mod prompts;
pub mod provider;
pub mod registry;

pub use benchmark::{Benchmark, JsonBenchmark};
pub use llm_service::LlmService;
pub use local_provider::LocalProvider;
pub use provider::{Generator, IngestOptions, PollOptions, Provider, SearchOptions};
