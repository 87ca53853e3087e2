use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::alert_parser::AlertEmail;

/// Open a SQLite pool for `database_url`, creating the file if needed.
///
/// In-memory databases are held on a single connection that is never
/// recycled, otherwise every new connection would see an empty database.
pub async fn connect_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let in_memory = database_url.contains(":memory:");

    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub struct EmailDatabase {
    pool: SqlitePool,
}

impl EmailDatabase {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = connect_pool(database_url).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS google_alert_emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                date TIMESTAMP NOT NULL,
                body_html TEXT,
                body_text TEXT,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mailbox_sync (
                mailbox_uri TEXT PRIMARY KEY,
                last_sync_date TIMESTAMP,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store an alert email unless one with the same Message-ID exists.
    ///
    /// Returns `true` when a new row was written.
    pub async fn save_alert_email(&self, email: &AlertEmail) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO google_alert_emails
                (message_id, subject, sender, date, body_html, body_text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(&email.message_id)
        .bind(&email.subject)
        .bind(&email.sender)
        .bind(email.date)
        .bind(&email.body_html)
        .bind(&email.body_text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count_emails(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM google_alert_emails")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Last time alerts were pulled from the given mailbox
    pub async fn last_sync(&self, mailbox_uri: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT last_sync_date FROM mailbox_sync WHERE mailbox_uri = $1")
            .bind(mailbox_uri)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(r.try_get("last_sync_date")?),
            None => Ok(None),
        }
    }

    pub async fn update_last_sync(
        &self,
        mailbox_uri: &str,
        sync_date: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mailbox_sync (mailbox_uri, last_sync_date, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (mailbox_uri)
            DO UPDATE SET
                last_sync_date = EXCLUDED.last_sync_date,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(mailbox_uri)
        .bind(sync_date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
