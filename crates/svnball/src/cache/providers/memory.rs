//! # Memory Store
//!
//! Process-local record storage.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::cache::providers::RecordStore;
use crate::cache::types::RevisionRecord;
use crate::error::StoreResult;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, RevisionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_or_create(&self, url: &str) -> StoreResult<RevisionRecord> {
        if let Some(record) = self.records.read().get(url) {
            return Ok(record.clone());
        }

        let mut records = self.records.write();
        let record = records.entry(url.to_string()).or_insert_with(|| {
            debug!(url = %url, "Created revision record");
            RevisionRecord::new(url)
        });
        Ok(record.clone())
    }

    async fn write(&self, record: &RevisionRecord) -> StoreResult<()> {
        self.records
            .write()
            .insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn urls(&self) -> StoreResult<Vec<String>> {
        let mut urls: Vec<String> = self.records.read().keys().cloned().collect();
        urls.sort();
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.get_or_create("http://host/a/trunk").await.unwrap();
        assert_eq!(first, RevisionRecord::new("http://host/a/trunk"));

        let mut updated = first.clone();
        updated.latest_revision = Some(7);
        store.write(&updated).await.unwrap();

        let again = store.get_or_create("http://host/a/trunk").await.unwrap();
        assert_eq!(again.latest_revision, Some(7));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_urls_are_sorted() {
        let store = MemoryStore::new();
        store.get_or_create("http://host/b").await.unwrap();
        store.get_or_create("http://host/a").await.unwrap();
        assert_eq!(
            store.urls().await.unwrap(),
            vec!["http://host/a".to_string(), "http://host/b".to_string()]
        );
    }
}
