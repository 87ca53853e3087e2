// Use the interfaces crate for core types
pub use interfaces::defs::{
    ArticleCandidate, ClassificationPayload, ClassificationResult, ClassificationState,
    LiveSourceSpec, NewArticle,
};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM request failed after {attempts} attempts: {last_error}")]
    LlmExhausted { attempts: u32, last_error: String },

    #[error("LLM rejected the request: {0}")]
    LlmResponse(String),

    #[error("Email ingestion error: {0}")]
    Ingestion(#[from] anyhow::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, FilterError>;
