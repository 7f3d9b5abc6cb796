//! SQLite backend.
//!
//! Timestamps are stored as integer microseconds since the epoch so that
//! `ORDER BY posted_at` is numeric and exact.

use super::{RecordOutcome, WatermarkStore, start_of_local_day};
use crate::error::StoreError;
use crate::models::{PublishedRecord, SinkReference, StoreStats};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS published_articles (
        url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        primary_sink_id TEXT NOT NULL,
        posted_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_published_articles_posted_at
        ON published_articles (posted_at)
    "#,
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn from_micros(url: &str, micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| StoreError::InvalidRecord {
        url: url.to_string(),
        reason: format!("timestamp {micros} out of range"),
    })
}

fn record_from_row(row: &SqliteRow) -> Result<PublishedRecord, StoreError> {
    let url: String = row.try_get("url")?;
    let posted_at = from_micros(&url, row.try_get("posted_at")?)?;
    let created_at = from_micros(&url, row.try_get("created_at")?)?;
    Ok(PublishedRecord {
        title: row.try_get("title")?,
        primary_sink_id: row.try_get("primary_sink_id")?,
        posted_at,
        created_at,
        url,
    })
}

impl SqliteStore {
    /// Open (creating when needed) the database at `url` and apply migrations.
    #[instrument(level = "info", skip_all)]
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| StoreError::Unavailable(format!("migration {i} failed: {e}")))?;
        }
        info!(migrations = MIGRATIONS.len(), "SQLite store ready");
        Ok(Self { pool })
    }
}

impl WatermarkStore for SqliteStore {
    async fn is_posted(&self, url: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM published_articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get_cursor(&self) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT url FROM published_articles ORDER BY posted_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<String, _>("url")).transpose()?)
    }

    #[instrument(level = "debug", skip(self, title, primary))]
    async fn record(
        &self,
        url: &str,
        title: &str,
        primary: &SinkReference,
        posted_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO published_articles (url, title, primary_sink_id, posted_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(url)
        .bind(title)
        .bind(&primary.id)
        .bind(posted_at.timestamp_micros())
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await?;

        let outcome = if result.rows_affected() == 1 {
            RecordOutcome::Inserted
        } else {
            RecordOutcome::AlreadyExists
        };
        debug!(?outcome, "Recorded watermark");
        Ok(outcome)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let since = start_of_local_day().timestamp_micros();
        let counts = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN posted_at >= ? THEN 1 ELSE 0 END), 0) AS today
            FROM published_articles
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = counts.try_get("total")?;
        let today: i64 = counts.try_get("today")?;

        let latest = self.recent(1).await?.into_iter().next();
        Ok(StoreStats {
            total_count: total.max(0) as u64,
            today_count: today.max(0) as u64,
            most_recent_title: latest.as_ref().map(|r| r.title.clone()),
            most_recent_timestamp: latest.map(|r| r.posted_at),
        })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PublishedRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT url, title, primary_sink_id, posted_at, created_at
            FROM published_articles
            ORDER BY posted_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get(&self, url: &str) -> Result<Option<PublishedRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT url, title, primary_sink_id, posted_at, created_at
            FROM published_articles
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn delete(&self, url: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM published_articles WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
