//! # Revision Cache
//!
//! Per-URL memo of repository revisions and directory listings, backed by a
//! pluggable [`RecordStore`] and kept fresh by a [`PeriodicRefresher`]
//! instead of on every read.

mod manager;
pub mod providers;
mod refresher;
mod types;

pub use manager::RevisionCache;
pub use refresher::{DEFAULT_REFRESH_INTERVAL, PeriodicRefresher};
pub use types::{RefreshOutcome, RefreshSummary, RepositoryTree, RevisionRecord};

pub use providers::{FileStore, MemoryStore, RecordStore};

#[cfg(test)]
pub(crate) use manager::tests::FakeSource;
