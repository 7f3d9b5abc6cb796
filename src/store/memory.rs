//! In-process backend for tests and dry runs. Nothing survives the process.

use super::{RecordOutcome, WatermarkStore, start_of_local_day};
use crate::error::StoreError;
use crate::models::{PublishedRecord, SinkReference, StoreStats};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, PublishedRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryStore {
    async fn is_posted(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(url))
    }

    async fn get_cursor(&self) -> Result<Option<String>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .max_by_key(|r| r.posted_at)
            .map(|r| r.url.clone()))
    }

    async fn record(
        &self,
        url: &str,
        title: &str,
        primary: &SinkReference,
        posted_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(url) {
            return Ok(RecordOutcome::AlreadyExists);
        }
        records.insert(
            url.to_string(),
            PublishedRecord {
                url: url.to_string(),
                title: title.to_string(),
                primary_sink_id: primary.id.clone(),
                posted_at,
                created_at: Utc::now(),
            },
        );
        Ok(RecordOutcome::Inserted)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let since = start_of_local_day();
        let records = self.records.read().await;
        let latest = records.values().max_by_key(|r| r.posted_at);
        Ok(StoreStats {
            total_count: records.len() as u64,
            today_count: records.values().filter(|r| r.posted_at >= since).count() as u64,
            most_recent_title: latest.map(|r| r.title.clone()),
            most_recent_timestamp: latest.map(|r| r.posted_at),
        })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PublishedRecord>, StoreError> {
        let records = self.records.read().await;
        let mut all: Vec<PublishedRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn get(&self, url: &str) -> Result<Option<PublishedRecord>, StoreError> {
        Ok(self.records.read().await.get(url).cloned())
    }

    async fn delete(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(url).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary(id: &str) -> SinkReference {
        SinkReference {
            sink: "blogger".into(),
            id: id.into(),
            url: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn test_double_record_keeps_one() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert_eq!(
            store.record("u", "t", &primary("1"), now).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            store.record("u", "t", &primary("2"), now).await.unwrap(),
            RecordOutcome::AlreadyExists
        );
        assert_eq!(store.stats().await.unwrap().total_count, 1);
        assert_eq!(store.get("u").await.unwrap().unwrap().primary_sink_id, "1");
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.record("u", "t", &primary("1"), Utc::now()).await.unwrap();
        assert!(other.is_posted("u").await.unwrap());
        assert_eq!(other.get_cursor().await.unwrap().as_deref(), Some("u"));
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for (i, url) in ["a", "b", "c"].iter().enumerate() {
            store
                .record(url, url, &primary(url), base + chrono::Duration::seconds(i as i64))
                .await
                .unwrap();
        }
        let urls: Vec<String> = store.recent(2).await.unwrap().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["c", "b"]);
    }
}
