use alert_filter::types::*;
use alert_filter::prompt::AUDIENCE_POLICY;
use alert_filter::{
    BatchConfig, BatchOrchestrator, CandidateStore, FilterStats, MockCompletionClient,
    PromptBuilder,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// In-memory store that records writes and can be told to fail some of them
#[derive(Default)]
struct FakeStore {
    candidates: Vec<ArticleCandidate>,
    failing_writes: HashSet<i64>,
    fail_fetch: bool,
    writes: Mutex<Vec<(i64, ClassificationPayload)>>,
    requested_limits: Mutex<Vec<Option<usize>>>,
}

impl FakeStore {
    fn with_articles(count: usize) -> Self {
        Self {
            candidates: (1..=count as i64).map(candidate).collect(),
            ..Self::default()
        }
    }

    fn failing_writes_for(mut self, ids: &[i64]) -> Self {
        self.failing_writes = ids.iter().copied().collect();
        self
    }

    fn writes(&self) -> Vec<(i64, ClassificationPayload)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateStore for FakeStore {
    async fn fetch_unclassified(&self, limit: Option<usize>) -> Result<Vec<ArticleCandidate>> {
        self.requested_limits.lock().unwrap().push(limit);
        if self.fail_fetch {
            return Err(FilterError::General("store offline".to_string()));
        }
        let take = limit.unwrap_or(self.candidates.len());
        Ok(self.candidates.iter().take(take).cloned().collect())
    }

    async fn write_result(&self, article_id: i64, payload: &ClassificationPayload) -> Result<bool> {
        if self.failing_writes.contains(&article_id) {
            return Err(FilterError::General(format!("disk full while writing {}", article_id)));
        }
        self.writes.lock().unwrap().push((article_id, payload.clone()));
        Ok(true)
    }
}

fn candidate(id: i64) -> ArticleCandidate {
    ArticleCandidate {
        id,
        email_message_id: "alert-1@google.com".to_string(),
        title: format!("Article number {}", id),
        url: format!("https://example.com/articles/{}", id),
        source: Some("example.com".to_string()),
        publish_time: None,
        summary: None,
        alert_subject: Some("Google Alert - automotive plant".to_string()),
        alert_date: Some(Utc::now()),
        created_at: Utc::now(),
        classification: None,
        filtered_at: None,
    }
}

/// A well-formed reply with one result per flag
fn reply(flags: &[bool]) -> String {
    let elements: Vec<_> = flags
        .iter()
        .map(|&is_selected| {
            json!({
                "is_selected": is_selected,
                "quality_score": if is_selected { 8 } else { 3 },
                "relevance_score": 7,
                "reason": "judged by test",
                "key_points": ["robots"],
                "category": "AI manufacturing"
            })
        })
        .collect();
    format!("```json\n{}\n```", serde_json::Value::Array(elements))
}

fn config(batch_size: usize) -> BatchConfig {
    BatchConfig {
        batch_size,
        inter_batch_delay_ms: 0,
    }
}

fn orchestrator(
    store: &Arc<FakeStore>,
    client: &Arc<MockCompletionClient>,
    batch_size: usize,
) -> BatchOrchestrator {
    BatchOrchestrator::new(store.clone(), client.clone(), config(batch_size))
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_later_batches() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(7));
    let client = Arc::new(MockCompletionClient::new(vec![
        Some(reply(&[true, false, true])),
        None,
        Some(reply(&[false])),
    ]));

    let stats = orchestrator(&store, &client, 3).run(None).await?;

    assert_eq!(
        stats,
        FilterStats {
            total: 7,
            processed: 4,
            selected: 2,
            rejected: 2,
            failed: 3,
        }
    );

    let written: Vec<i64> = store.writes().iter().map(|(id, _)| *id).collect();
    assert_eq!(written, vec![1, 2, 3, 7]);
    assert_eq!(client.prompts().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_unparseable_reply_writes_nothing() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(3));
    let client = Arc::new(MockCompletionClient::new(vec![Some("not json at all")]));

    let stats = orchestrator(&store, &client, 5).run(None).await?;

    assert_eq!(stats.total, 3);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.processed, 0);
    assert!(store.writes().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_short_reply_only_fails_missing_positions() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(3));
    let client = Arc::new(MockCompletionClient::new(vec![Some(reply(&[true, false]))]));

    let stats = orchestrator(&store, &client, 3).run(None).await?;

    assert_eq!(stats.selected, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.failed, 1);

    let writes = store.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0, 1);
    assert!(writes[0].1.is_selected);
    assert_eq!(writes[1].0, 2);
    assert!(!writes[1].1.is_selected);
    Ok(())
}

#[tokio::test]
async fn test_write_failure_does_not_block_siblings() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(3).failing_writes_for(&[2]));
    let client = Arc::new(MockCompletionClient::new(vec![Some(reply(&[true, true, false]))]));

    let stats = orchestrator(&store, &client, 3).run(None).await?;

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    let written: Vec<i64> = store.writes().iter().map(|(id, _)| *id).collect();
    assert_eq!(written, vec![1, 3]);
    Ok(())
}

#[tokio::test]
async fn test_prompts_follow_batch_order() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(5));
    let client = Arc::new(MockCompletionClient::new(vec![
        Some(reply(&[true, true])),
        Some(reply(&[true, true])),
        Some(reply(&[true])),
    ]));

    orchestrator(&store, &client, 2).run(Some(5)).await?;

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("[Article 1]\nTitle: Article number 1"));
    assert!(prompts[0].contains("[Article 2]\nTitle: Article number 2"));
    assert!(!prompts[0].contains("Article number 3"));
    assert!(prompts[1].contains("[Article 1]\nTitle: Article number 3"));
    assert!(prompts[2].contains("exactly 1 objects"));
    assert_eq!(*store.requested_limits.lock().unwrap(), vec![Some(5)]);
    Ok(())
}

#[tokio::test]
async fn test_limit_and_empty_store() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(0));
    let client = Arc::new(MockCompletionClient::new(Vec::<Option<String>>::new()));

    let stats = orchestrator(&store, &client, 5).run(Some(10)).await?;

    assert_eq!(stats, FilterStats::default());
    assert!(client.prompts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_returned() {
    let store = Arc::new(FakeStore {
        fail_fetch: true,
        ..FakeStore::default()
    });
    let client = Arc::new(MockCompletionClient::new(Vec::<Option<String>>::new()));

    let result = orchestrator(&store, &client, 5).run(None).await;
    assert!(matches!(result, Err(FilterError::General(_))));
}

#[tokio::test]
async fn test_single_article_batches_with_delay() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(3));
    let client = Arc::new(MockCompletionClient::new(vec![
        Some(reply(&[true])),
        Some(reply(&[false])),
        Some(reply(&[true])),
    ]));
    let config = BatchConfig {
        batch_size: 1,
        inter_batch_delay_ms: 5,
    };

    let stats = BatchOrchestrator::new(store.clone(), client.clone(), config).run(None).await?;

    assert_eq!(stats.selected, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(client.prompts().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_custom_prompt_builder_is_used_for_every_batch() -> Result<()> {
    let store = Arc::new(FakeStore::with_articles(3));
    let client = Arc::new(MockCompletionClient::new(vec![
        Some(reply(&[true, false])),
        Some(reply(&[true])),
    ]));
    let policy = "Keep only articles about new battery plants.";

    let stats = orchestrator(&store, &client, 2)
        .with_prompt_builder(PromptBuilder::new().with_policy(policy))
        .run(None)
        .await?;

    assert_eq!(stats.processed, 3);
    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2);
    for prompt in &prompts {
        assert!(prompt.starts_with(policy), "{}", prompt);
        assert!(!prompt.contains(AUDIENCE_POLICY.trim()));
    }
    Ok(())
}
