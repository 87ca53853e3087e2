use crate::types::{ArticleCandidate, ClassificationPayload, Result};
use async_trait::async_trait;

/// Where article candidates come from and where decisions are written back to
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Unclassified candidates in store order, at most `limit` of them when given
    async fn fetch_unclassified(&self, limit: Option<usize>) -> Result<Vec<ArticleCandidate>>;

    /// Persist a full classification for one article.
    ///
    /// Returns `false` when no unclassified article with that id exists.
    async fn write_result(&self, article_id: i64, payload: &ClassificationPayload) -> Result<bool>;
}

/// Text-in, text-out access to a language model
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Human-readable name for logging
    fn client_name(&self) -> String;

    /// Send one prompt and return the raw reply text.
    ///
    /// Transient failures are retried internally; an error means no reply is coming.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
