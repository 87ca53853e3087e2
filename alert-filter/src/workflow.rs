use crate::report::FilterReport;
use crate::store::{ArticleStore, StoreStatistics};
use crate::types::Result;
use chrono::{DateTime, Duration, Utc};
use email_ingestion::{AlertEmail, EmailDatabase, EmailIngester};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub emails_seen: usize,
    pub new_emails: usize,
    pub new_articles: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseOverview {
    pub total_emails: i64,
    pub articles: StoreStatistics,
}

/// Ties alert ingestion, article storage and reporting to one database
pub struct AlertWorkflow {
    store: Arc<ArticleStore>,
    emails: EmailDatabase,
}

impl AlertWorkflow {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = email_ingestion::connect_pool(database_url).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Arc::new(ArticleStore::with_pool(pool.clone()));
        let emails = EmailDatabase::with_pool(pool);

        emails.setup_schema().await?;
        store.setup_schema().await?;

        Ok(Self { store, emails })
    }

    pub fn store(&self) -> Arc<ArticleStore> {
        self.store.clone()
    }

    /// Persist parsed alert emails and the articles extracted from them.
    pub async fn ingest_alerts(&self, alerts: &[AlertEmail]) -> Result<IngestSummary> {
        let mut summary = IngestSummary {
            emails_seen: alerts.len(),
            ..IngestSummary::default()
        };

        for alert in alerts {
            if self.emails.save_alert_email(alert).await? {
                summary.new_emails += 1;
            }

            if alert.articles.is_empty() {
                warn!("No articles found in alert '{}'", alert.subject);
                continue;
            }
            summary.new_articles += self.store.save_articles(&alert.articles).await?.len();
        }

        info!(
            "Stored {} new emails and {} new articles from {} alerts",
            summary.new_emails, summary.new_articles, summary.emails_seen
        );
        Ok(summary)
    }

    /// Where the next fetch from `source_uri` should start, given a look-back of `days`.
    pub async fn sync_window_start(&self, source_uri: &str, days: u32) -> Result<DateTime<Utc>> {
        let last_sync = self.emails.last_sync(source_uri).await?;
        Ok(fetch_window_start(days, last_sync, Utc::now()))
    }

    /// Pull alerts from the mailbox since the last sync (at most `days` back) and store them.
    pub async fn fetch_and_store(
        &self,
        ingester: &EmailIngester,
        days: u32,
    ) -> Result<IngestSummary> {
        let source_uri = ingester.source().uri;
        let started_at = Utc::now();
        let since = self.sync_window_start(&source_uri, days).await?;

        let alerts = ingester.fetch_alerts_since(since).await?;
        let summary = self.ingest_alerts(&alerts).await?;
        self.emails.update_last_sync(&source_uri, started_at).await?;
        Ok(summary)
    }

    pub async fn report(&self, days: u32) -> Result<FilterReport> {
        let selected = self.store.selected_articles(days).await?;
        Ok(FilterReport::build(&selected, days))
    }

    pub async fn overview(&self) -> Result<DatabaseOverview> {
        Ok(DatabaseOverview {
            total_emails: self.emails.count_emails().await?,
            articles: self.store.statistics().await?,
        })
    }
}

/// The later of `days` before `now` and the last sync, never past `now`
pub fn fetch_window_start(
    days: u32,
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let look_back = now - Duration::days(i64::from(days));
    match last_sync {
        Some(last_sync) if last_sync > look_back => last_sync.min(now),
        _ => look_back,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_starts_at_recent_sync() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let synced = Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap();

        assert_eq!(fetch_window_start(7, Some(synced), now), synced);
    }

    #[test]
    fn window_is_capped_by_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let stale = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let week_ago = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();

        assert_eq!(fetch_window_start(7, Some(stale), now), week_ago);
        assert_eq!(fetch_window_start(7, None, now), week_ago);
    }

    #[test]
    fn future_sync_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let ahead = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();

        assert_eq!(fetch_window_start(1, Some(ahead), now), now);
    }
}
