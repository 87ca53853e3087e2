use alert_filter::types::*;
use alert_filter::{ArticleStore, CandidateStore};
use chrono::{Duration, Utc};

async fn setup_store() -> Result<ArticleStore> {
    let store = ArticleStore::connect("sqlite::memory:").await?;
    store.setup_schema().await?;
    Ok(store)
}

fn new_article(url: &str) -> NewArticle {
    NewArticle {
        email_message_id: "alert-1@google.com".to_string(),
        title: format!("Title for {}", url),
        url: url.to_string(),
        source: Some("autonews.com".to_string()),
        publish_time: None,
        summary: Some(
            "A new battery plant with 2,000 robots and an automated body shop.".to_string(),
        ),
        alert_subject: Some("Google Alert - battery plant".to_string()),
        alert_date: Some(Utc::now()),
    }
}

fn payload(is_selected: bool, quality: f64) -> ClassificationPayload {
    ClassificationPayload {
        is_selected,
        quality_score: quality,
        relevance_score: 8.0,
        reason: "covers line layout".to_string(),
        key_points: vec!["gigacasting".to_string(), "paint shop".to_string()],
        category: "advanced manufacturing".to_string(),
    }
}

#[tokio::test]
async fn test_articles_are_deduplicated_by_url() -> Result<()> {
    let store = setup_store().await?;

    let first = store
        .save_articles(&[
            new_article("https://example.com/a"),
            new_article("https://example.com/b"),
        ])
        .await?;
    assert_eq!(first.len(), 2);

    let second = store
        .save_articles(&[
            new_article("https://example.com/b"),
            new_article("https://example.com/c"),
        ])
        .await?;
    assert_eq!(second.len(), 1);

    assert_eq!(store.statistics().await?.total_articles, 3);
    Ok(())
}

#[tokio::test]
async fn test_fetch_unclassified_newest_first_with_limit() -> Result<()> {
    let store = setup_store().await?;
    let ids = store
        .save_articles(&[
            new_article("https://example.com/1"),
            new_article("https://example.com/2"),
            new_article("https://example.com/3"),
        ])
        .await?;

    let all = store.fetch_unclassified(None).await?;
    let fetched: Vec<i64> = all.iter().map(|a| a.id).collect();
    assert_eq!(fetched, vec![ids[2], ids[1], ids[0]]);
    assert!(all.iter().all(|a| a.state() == ClassificationState::Unclassified));

    let limited = store.fetch_unclassified(Some(2)).await?;
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, ids[2]);
    Ok(())
}

#[tokio::test]
async fn test_write_result_stores_full_payload_once() -> Result<()> {
    let store = setup_store().await?;
    let ids = store.save_articles(&[new_article("https://example.com/a")]).await?;

    assert!(store.write_result(ids[0], &payload(true, 9.0)).await?);
    // A second decision for the same article is refused
    assert!(!store.write_result(ids[0], &payload(false, 2.0)).await?);
    assert!(!store.write_result(9999, &payload(true, 9.0)).await?);

    let stored = store.get_article(ids[0]).await?.expect("article should exist");
    assert_eq!(stored.state(), ClassificationState::Accepted);
    assert_eq!(stored.classification, Some(payload(true, 9.0)));
    assert!(stored.filtered_at.is_some());

    assert!(store.fetch_unclassified(None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_selected_articles_and_statistics() -> Result<()> {
    let store = setup_store().await?;

    let mut old = new_article("https://example.com/old");
    old.alert_date = Some(Utc::now() - Duration::days(30));
    let ids = store
        .save_articles(&[
            new_article("https://example.com/good"),
            new_article("https://example.com/better"),
            new_article("https://example.com/rejected"),
            old,
            new_article("https://example.com/pending"),
        ])
        .await?;

    store.write_result(ids[0], &payload(true, 6.0)).await?;
    store.write_result(ids[1], &payload(true, 9.0)).await?;
    store.write_result(ids[2], &payload(false, 3.0)).await?;
    store.write_result(ids[3], &payload(true, 10.0)).await?;

    let selected = store.selected_articles(7).await?;
    let urls: Vec<&str> = selected.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(urls, vec!["https://example.com/better", "https://example.com/good"]);

    let stats = store.statistics().await?;
    assert_eq!(stats.total_articles, 5);
    assert_eq!(stats.filtered_articles, 4);
    assert_eq!(stats.selected_articles, 3);
    assert!((stats.filter_rate - 0.8).abs() < 1e-9);
    assert!((stats.selection_rate - 0.75).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_store_through_trait_object() -> Result<()> {
    let store = setup_store().await?;
    let ids = store.save_articles(&[new_article("https://example.com/a")]).await?;

    let candidates: &dyn CandidateStore = &store;
    let pending = candidates.fetch_unclassified(Some(10)).await?;
    assert_eq!(pending.len(), 1);
    assert!(candidates.write_result(ids[0], &payload(false, 4.0)).await?);
    assert_eq!(
        store.get_article(ids[0]).await?.map(|a| a.state()),
        Some(ClassificationState::Rejected)
    );
    Ok(())
}

#[tokio::test]
async fn test_empty_statistics() -> Result<()> {
    let store = setup_store().await?;
    let stats = store.statistics().await?;

    assert_eq!(stats.total_articles, 0);
    assert_eq!(stats.filter_rate, 0.0);
    assert_eq!(stats.selection_rate, 0.0);
    Ok(())
}
