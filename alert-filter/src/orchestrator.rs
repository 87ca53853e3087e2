use crate::config::BatchConfig;
use crate::decoder::decode_batch;
use crate::prompt::PromptBuilder;
use crate::traits::{CandidateStore, CompletionClient};
use crate::types::{ArticleCandidate, ClassificationResult, Result};
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Terminal state of one submitted article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleOutcome {
    Accepted,
    Rejected,
    DecodeFailed,
    WriteFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub processed: usize,
    pub selected: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl FilterStats {
    pub fn record(&mut self, outcome: ArticleOutcome) {
        self.total += 1;
        match outcome {
            ArticleOutcome::Accepted => {
                self.processed += 1;
                self.selected += 1;
            }
            ArticleOutcome::Rejected => {
                self.processed += 1;
                self.rejected += 1;
            }
            ArticleOutcome::DecodeFailed | ArticleOutcome::WriteFailed => self.failed += 1,
        }
    }
}

/// Split `len` items into consecutive ranges of at most `batch_size` items.
pub fn partition_batches(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

/// Drives prompt building, completion, decoding and write-back one batch at a time
pub struct BatchOrchestrator {
    store: Arc<dyn CandidateStore>,
    client: Arc<dyn CompletionClient>,
    prompt_builder: PromptBuilder,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        client: Arc<dyn CompletionClient>,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            client,
            prompt_builder: PromptBuilder::new(),
            config,
        }
    }

    pub fn with_prompt_builder(mut self, prompt_builder: PromptBuilder) -> Self {
        self.prompt_builder = prompt_builder;
        self
    }

    /// Classify up to `limit` unclassified articles (all of them when `None`).
    ///
    /// Only a failure to read candidates is returned as an error; everything
    /// after that is folded into the statistics.
    pub async fn run(&self, limit: Option<usize>) -> Result<FilterStats> {
        let candidates = self.store.fetch_unclassified(limit).await?;

        if candidates.is_empty() {
            info!("No unclassified articles to filter");
            return Ok(FilterStats::default());
        }

        info!(
            "Filtering {} articles with {} in batches of {}",
            candidates.len(),
            self.client.client_name(),
            self.config.batch_size
        );

        let stats = self.classify(&candidates).await;

        info!(
            "Filtering finished: {} total, {} processed, {} selected, {} rejected, {} failed",
            stats.total, stats.processed, stats.selected, stats.rejected, stats.failed
        );
        Ok(stats)
    }

    pub async fn classify(&self, candidates: &[ArticleCandidate]) -> FilterStats {
        let batches = partition_batches(candidates.len(), self.config.batch_size);
        let batch_count = batches.len();
        let mut stats = FilterStats::default();

        for (index, range) in batches.into_iter().enumerate() {
            let batch = &candidates[range];
            info!("Processing batch {}/{} ({} articles)", index + 1, batch_count, batch.len());

            for outcome in self.process_batch(batch).await {
                stats.record(outcome);
            }

            if index + 1 < batch_count && self.config.inter_batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_batch_delay_ms)).await;
            }
        }

        stats
    }

    /// One outcome per article, in batch order
    async fn process_batch(&self, batch: &[ArticleCandidate]) -> Vec<ArticleOutcome> {
        let prompt = self.prompt_builder.build(batch);

        let results = match self.client.complete(&prompt).await {
            Ok(reply) => decode_batch(&reply, batch.len()),
            Err(e) => {
                error!("No reply for batch of {} articles: {}", batch.len(), e);
                vec![ClassificationResult::Absent; batch.len()]
            }
        };

        let mut outcomes = Vec::with_capacity(batch.len());
        for (article, result) in batch.iter().zip(results) {
            let outcome = match result {
                ClassificationResult::Absent => {
                    warn!(
                        "No usable classification for article {} ({})",
                        article.id, article.title
                    );
                    ArticleOutcome::DecodeFailed
                }
                ClassificationResult::Present(payload) => {
                    match self.store.write_result(article.id, &payload).await {
                        Ok(true) if payload.is_selected => ArticleOutcome::Accepted,
                        Ok(true) => ArticleOutcome::Rejected,
                        Ok(false) => {
                            warn!(
                                "Article {} was not updated, it is missing or already classified",
                                article.id
                            );
                            ArticleOutcome::WriteFailed
                        }
                        Err(e) => {
                            error!(
                                "Failed to save classification for article {}: {}",
                                article.id, e
                            );
                            ArticleOutcome::WriteFailed
                        }
                    }
                }
            };
            debug!("Article {} -> {:?}", article.id, outcome);
            outcomes.push(outcome);
        }

        outcomes
    }
}
