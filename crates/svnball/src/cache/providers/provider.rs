//! # Record Store
//!
//! Persistence seam for [`RevisionRecord`]s.

use async_trait::async_trait;

use crate::cache::types::RevisionRecord;
use crate::error::StoreResult;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record for `url`, creating and persisting an empty one if
    /// none exists yet.
    async fn get_or_create(&self, url: &str) -> StoreResult<RevisionRecord>;

    /// Insert or replace the record keyed by `record.url`.
    async fn write(&self, record: &RevisionRecord) -> StoreResult<()>;

    /// Every URL with a stored record, sorted.
    async fn urls(&self) -> StoreResult<Vec<String>>;
}
