pub mod types;
pub mod config;
pub mod traits;
pub mod prompt;
pub mod decoder;
pub mod llm_client;
pub mod store;
pub mod orchestrator;
pub mod report;
pub mod workflow;

pub use types::*;
pub use config::{BatchConfig, FilterConfig, ImapSettings, LlmConfig};
pub use traits::{CandidateStore, CompletionClient};
pub use prompt::PromptBuilder;
pub use decoder::decode_batch;
pub use llm_client::{ChatCompletionClient, MockCompletionClient};
pub use store::{ArticleStore, StoreStatistics};
pub use orchestrator::{partition_batches, ArticleOutcome, BatchOrchestrator, FilterStats};
pub use report::{export_json, FilterReport};
pub use workflow::{fetch_window_start, AlertWorkflow, DatabaseOverview, IngestSummary};
