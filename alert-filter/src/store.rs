use crate::traits::CandidateStore;
use crate::types::{ArticleCandidate, ClassificationPayload, NewArticle, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

const ARTICLE_COLUMNS: &str = "id, email_message_id, title, url, source, publish_time, summary, \
    alert_subject, alert_date, created_at, is_selected, quality_score, relevance_score, \
    filter_reason, key_points, category, filtered_at";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStatistics {
    pub total_articles: i64,
    pub filtered_articles: i64,
    pub selected_articles: i64,
    pub filter_rate: f64,
    pub selection_rate: f64,
}

/// SQLite-backed article table shared by ingestion and classification
pub struct ArticleStore {
    db: SqlitePool,
}

impl ArticleStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = email_ingestion::connect_pool(database_url).await?;
        Ok(Self { db })
    }

    pub fn with_pool(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_message_id TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                source TEXT,
                publish_time TEXT,
                summary TEXT,
                alert_subject TEXT,
                alert_date TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                is_selected BOOLEAN,
                quality_score REAL,
                relevance_score REAL,
                filter_reason TEXT,
                key_points TEXT,
                category TEXT,
                filtered_at TIMESTAMP
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_news_articles_is_selected \
             ON news_articles (is_selected)",
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Insert newly extracted articles, skipping URLs that are already stored.
    ///
    /// Returns the ids of the rows that were actually written.
    pub async fn save_articles(&self, articles: &[NewArticle]) -> Result<Vec<i64>> {
        let mut tx = self.db.begin().await?;
        let mut inserted = Vec::new();

        for article in articles {
            let result = sqlx::query(
                r#"
                INSERT INTO news_articles
                    (email_message_id, title, url, source, publish_time, summary,
                     alert_subject, alert_date, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (url) DO NOTHING
                "#,
            )
            .bind(&article.email_message_id)
            .bind(&article.title)
            .bind(&article.url)
            .bind(&article.source)
            .bind(&article.publish_time)
            .bind(&article.summary)
            .bind(&article.alert_subject)
            .bind(article.alert_date)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                inserted.push(result.last_insert_rowid());
            } else {
                debug!("Skipping already stored article: {}", article.url);
            }
        }

        tx.commit().await?;
        info!(
            "Saved {} new articles ({} already stored)",
            inserted.len(),
            articles.len() - inserted.len()
        );
        Ok(inserted)
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<ArticleCandidate>> {
        let sql = format!("SELECT {} FROM news_articles WHERE id = $1", ARTICLE_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;

        row.as_ref().map(row_to_candidate).transpose()
    }

    /// Newest first; a negative SQLite LIMIT means no limit
    pub async fn fetch_unclassified(&self, limit: Option<usize>) -> Result<Vec<ArticleCandidate>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let rows = sqlx::query(&format!(
            "SELECT {} FROM news_articles WHERE is_selected IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT $1",
            ARTICLE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    /// Write every classification field in one statement.
    ///
    /// Only rows that are still unclassified are touched.
    pub async fn write_result(
        &self,
        article_id: i64,
        payload: &ClassificationPayload,
    ) -> Result<bool> {
        let key_points = serde_json::to_string(&payload.key_points)?;

        let result = sqlx::query(
            r#"
            UPDATE news_articles
            SET is_selected = $1, quality_score = $2, relevance_score = $3, filter_reason = $4,
                key_points = $5, category = $6, filtered_at = $7
            WHERE id = $8 AND is_selected IS NULL
            "#,
        )
        .bind(payload.is_selected)
        .bind(payload.quality_score)
        .bind(payload.relevance_score)
        .bind(&payload.reason)
        .bind(key_points)
        .bind(&payload.category)
        .bind(Utc::now())
        .bind(article_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Accepted articles from alerts of the last `days` days, best first
    pub async fn selected_articles(&self, days: u32) -> Result<Vec<ArticleCandidate>> {
        let since = Utc::now() - Duration::days(i64::from(days));

        let rows = sqlx::query(&format!(
            "SELECT {} FROM news_articles WHERE is_selected = 1 AND alert_date >= $1 \
             ORDER BY quality_score DESC, relevance_score DESC, id ASC",
            ARTICLE_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    pub async fn statistics(&self) -> Result<StoreStatistics> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(is_selected) AS filtered,
                COALESCE(SUM(CASE WHEN is_selected = 1 THEN 1 ELSE 0 END), 0) AS selected
            FROM news_articles
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let total_articles: i64 = row.try_get("total")?;
        let filtered_articles: i64 = row.try_get("filtered")?;
        let selected_articles: i64 = row.try_get("selected")?;

        Ok(StoreStatistics {
            total_articles,
            filtered_articles,
            selected_articles,
            filter_rate: ratio(filtered_articles, total_articles),
            selection_rate: ratio(selected_articles, filtered_articles),
        })
    }
}

fn ratio(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn row_to_candidate(row: &SqliteRow) -> Result<ArticleCandidate> {
    let is_selected: Option<bool> = row.try_get("is_selected")?;

    let classification = match is_selected {
        Some(is_selected) => {
            let key_points: Option<String> = row.try_get("key_points")?;
            let key_points = match key_points {
                Some(text) => serde_json::from_str(&text)?,
                None => Vec::new(),
            };
            Some(ClassificationPayload {
                is_selected,
                quality_score: row.try_get("quality_score")?,
                relevance_score: row.try_get("relevance_score")?,
                reason: row.try_get("filter_reason")?,
                key_points,
                category: row.try_get("category")?,
            })
        }
        None => None,
    };

    Ok(ArticleCandidate {
        id: row.try_get("id")?,
        email_message_id: row.try_get("email_message_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        source: row.try_get("source")?,
        publish_time: row.try_get("publish_time")?,
        summary: row.try_get("summary")?,
        alert_subject: row.try_get("alert_subject")?,
        alert_date: row.try_get("alert_date")?,
        created_at: row.try_get("created_at")?,
        classification,
        filtered_at: row.try_get("filtered_at")?,
    })
}

#[async_trait]
impl CandidateStore for ArticleStore {
    async fn fetch_unclassified(&self, limit: Option<usize>) -> Result<Vec<ArticleCandidate>> {
        ArticleStore::fetch_unclassified(self, limit).await
    }

    async fn write_result(&self, article_id: i64, payload: &ClassificationPayload) -> Result<bool> {
        ArticleStore::write_result(self, article_id, payload).await
    }
}
