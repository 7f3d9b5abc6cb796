//! Watermark store.
//!
//! The store owns the [`PublishedRecord`] lifecycle. A record is written
//! once, after every sink succeeded, and is never updated. Uniqueness on
//! `url` is the only definition of "already processed"; the cursor is the
//! url of the record with the greatest `posted_at`.
//!
//! | Backend | Connection string |
//! |---------|-------------------|
//! | [`SqliteStore`] | `sqlite://path/to/file.db?mode=rwc` |
//! | [`MemoryStore`] | `memory://` |

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{PublishedRecord, SinkReference, StoreStats};
use chrono::{DateTime, Local, Utc};
use tracing::info;

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// A record for the url existed already; treated as success by callers.
    AlreadyExists,
}

pub trait WatermarkStore {
    async fn is_posted(&self, url: &str) -> Result<bool, StoreError>;

    /// Url of the most recently posted record.
    async fn get_cursor(&self) -> Result<Option<String>, StoreError>;

    /// Insert a record unless one exists for `url`.
    async fn record(
        &self,
        url: &str,
        title: &str,
        primary: &SinkReference,
        posted_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<PublishedRecord>, StoreError>;

    async fn get(&self, url: &str) -> Result<Option<PublishedRecord>, StoreError>;

    /// Administrative removal. Returns whether a record was deleted.
    async fn delete(&self, url: &str) -> Result<bool, StoreError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Midnight of the current local day, in UTC.
pub fn start_of_local_day() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

/// A store chosen at runtime from its connection string.
#[derive(Debug, Clone)]
pub enum Store {
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let store = if url.starts_with("memory://") {
            Store::Memory(MemoryStore::new())
        } else if url.starts_with("sqlite:") {
            Store::Sqlite(SqliteStore::connect(url).await?)
        } else {
            return Err(StoreError::Unavailable(format!(
                "unsupported store url `{url}` (expected sqlite:// or memory://)"
            )));
        };
        info!(backend = store.backend_name(), "Connected watermark store");
        Ok(store)
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Sqlite(_) => "sqlite",
            Store::Memory(_) => "memory",
        }
    }
}

impl WatermarkStore for Store {
    async fn is_posted(&self, url: &str) -> Result<bool, StoreError> {
        match self {
            Store::Sqlite(s) => s.is_posted(url).await,
            Store::Memory(s) => s.is_posted(url).await,
        }
    }

    async fn get_cursor(&self) -> Result<Option<String>, StoreError> {
        match self {
            Store::Sqlite(s) => s.get_cursor().await,
            Store::Memory(s) => s.get_cursor().await,
        }
    }

    async fn record(
        &self,
        url: &str,
        title: &str,
        primary: &SinkReference,
        posted_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError> {
        match self {
            Store::Sqlite(s) => s.record(url, title, primary, posted_at).await,
            Store::Memory(s) => s.record(url, title, primary, posted_at).await,
        }
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        match self {
            Store::Sqlite(s) => s.stats().await,
            Store::Memory(s) => s.stats().await,
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PublishedRecord>, StoreError> {
        match self {
            Store::Sqlite(s) => s.recent(limit).await,
            Store::Memory(s) => s.recent(limit).await,
        }
    }

    async fn get(&self, url: &str) -> Result<Option<PublishedRecord>, StoreError> {
        match self {
            Store::Sqlite(s) => s.get(url).await,
            Store::Memory(s) => s.get(url).await,
        }
    }

    async fn delete(&self, url: &str) -> Result<bool, StoreError> {
        match self {
            Store::Sqlite(s) => s.delete(url).await,
            Store::Memory(s) => s.delete(url).await,
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Store::Sqlite(s) => s.ping().await,
            Store::Memory(s) => s.ping().await,
        }
    }
}
