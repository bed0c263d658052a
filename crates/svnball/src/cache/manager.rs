//! # Revision Cache
//!
//! Memoizes info-source answers per URL. Reads are served from the record
//! store; the info source is only consulted when a value is missing or
//! flagged for refresh. A failed refresh keeps the old value and leaves the
//! flag set, so stale data wins over a failed request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::cache::providers::RecordStore;
use crate::cache::types::{RefreshOutcome, RefreshSummary, RepositoryTree, RevisionRecord};
use crate::error::{CacheError, InfoError, StoreResult};
use crate::location;
use crate::svn::{ChildEntry, InfoSource};

#[derive(Clone)]
pub struct RevisionCache {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn InfoSource>,
}

impl RevisionCache {
    pub fn new(store: Arc<dyn RecordStore>, source: Arc<dyn InfoSource>) -> Self {
        Self { store, source }
    }

    /// The record for `url`, created empty on first sight.
    pub async fn get(&self, url: &str) -> StoreResult<RevisionRecord> {
        self.store.get_or_create(url).await
    }

    /// Latest revision of `url`.
    ///
    /// Errors only when no revision was ever fetched and fetching one now
    /// fails.
    pub async fn latest_revision(&self, url: &str) -> Result<u64, CacheError> {
        let mut record = self.get(url).await?;
        if !record.needs_revision_refresh {
            if let Some(revision) = record.latest_revision {
                return Ok(revision);
            }
        }

        record.needs_revision_refresh = true;
        let outcome = self.refresh_record(record).await?;
        match (outcome.record.latest_revision, outcome.revision_error) {
            (Some(revision), None) => Ok(revision),
            (Some(revision), Some(e)) => {
                warn!(url = %url, revision, error = %e, "Serving stale revision");
                Ok(revision)
            }
            (None, Some(e)) => Err(e.into()),
            (None, None) => Err(InfoError::Parse(format!("no revision recorded for {url}")).into()),
        }
    }

    /// Children of `url`, fetched on first use like [`Self::latest_revision`].
    pub async fn child_directories(
        &self,
        url: &str,
    ) -> Result<BTreeMap<String, ChildEntry>, CacheError> {
        let mut record = self.get(url).await?;
        if !record.needs_child_dir_refresh {
            if let Some(children) = record.child_directories {
                return Ok(children);
            }
        }

        record.needs_child_dir_refresh = true;
        let outcome = self.refresh_record(record).await?;
        match (outcome.record.child_directories, outcome.listing_error) {
            (Some(children), None) => Ok(children),
            (Some(children), Some(e)) => {
                warn!(url = %url, error = %e, "Serving stale directory listing");
                Ok(children)
            }
            (None, Some(e)) => Err(e.into()),
            (None, None) => Err(InfoError::Parse(format!("no listing recorded for {url}")).into()),
        }
    }

    /// Fetch whatever `url` has flagged as stale.
    pub async fn refresh(&self, url: &str) -> StoreResult<RefreshOutcome> {
        let record = self.get(url).await?;
        if !record.has_pending_refresh() {
            debug!(url = %url, "Nothing flagged for refresh");
            return Ok(RefreshOutcome {
                record,
                revision_error: None,
                listing_error: None,
            });
        }
        self.refresh_record(record).await
    }

    /// Flag both fields of `url` as stale and refresh them now.
    pub async fn force_refresh(&self, url: &str) -> StoreResult<RefreshOutcome> {
        let mut record = self.get(url).await?;
        record.needs_revision_refresh = true;
        record.needs_child_dir_refresh = true;
        self.refresh_record(record).await
    }

    /// Flag every known URL as stale and refresh it.
    pub async fn refresh_all(&self) -> StoreResult<RefreshSummary> {
        let mut summary = RefreshSummary::default();

        for url in self.store.urls().await? {
            let outcome = self.force_refresh(&url).await?;
            if outcome.is_clean() {
                summary.refreshed += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "Refreshed revision cache"
        );
        Ok(summary)
    }

    /// Expand the branch layout below `url`. Directories holding only
    /// directories are descended into, at most `max_depth` levels deep.
    pub async fn tree(&self, url: &str, max_depth: usize) -> Result<RepositoryTree, CacheError> {
        self.subtree(url.trim_end_matches('/').to_string(), max_depth)
            .await
    }

    fn subtree(
        &self,
        url: String,
        depth: usize,
    ) -> BoxFuture<'_, Result<RepositoryTree, CacheError>> {
        Box::pin(async move {
            let leaf = || RepositoryTree::Leaf(location::parse(&url).instance);
            if depth == 0 {
                return Ok(leaf());
            }

            let children = self.child_directories(&url).await?;
            if !crate::svn::is_branch_container(&children) {
                return Ok(leaf());
            }

            let mut tree = BTreeMap::new();
            for name in children.keys() {
                let child_url = format!("{url}/{name}");
                tree.insert(name.clone(), self.subtree(child_url, depth - 1).await?);
            }
            Ok(RepositoryTree::Container(tree))
        })
    }

    async fn refresh_record(&self, mut record: RevisionRecord) -> StoreResult<RefreshOutcome> {
        let mut revision_error = None;
        let mut listing_error = None;
        let mut changed = false;

        if record.needs_revision_refresh {
            match self.source.latest_revision(&record.url).await {
                Ok(revision) => {
                    debug!(url = %record.url, revision, "Revision refreshed");
                    record.latest_revision = Some(revision);
                    record.needs_revision_refresh = false;
                    changed = true;
                }
                Err(e) => {
                    warn!(url = %record.url, error = %e, "Revision refresh failed");
                    revision_error = Some(e);
                }
            }
        }

        if record.needs_child_dir_refresh {
            match self.source.child_directories(&record.url).await {
                Ok(listing) => {
                    debug!(url = %record.url, entries = listing.entries.len(), "Listing refreshed");
                    record.child_directories = Some(listing.entries);
                    record.needs_child_dir_refresh = false;
                    changed = true;
                }
                Err(e) => {
                    warn!(url = %record.url, error = %e, "Listing refresh failed");
                    listing_error = Some(e);
                }
            }
        }

        if changed {
            record.refreshed_at = Some(Utc::now());
        }
        self.store.write(&record).await?;

        Ok(RefreshOutcome {
            record,
            revision_error,
            listing_error,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::providers::MemoryStore;
    use crate::svn::{DirectoryListing, EntryKind};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    /// Scriptable info source counting every query.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub revision: AtomicU64,
        pub failing: AtomicBool,
        pub revision_calls: AtomicUsize,
        pub listing_calls: AtomicUsize,
        pub listings: Mutex<HashMap<String, DirectoryListing>>,
    }

    impl FakeSource {
        pub(crate) fn with_revision(revision: u64) -> Self {
            let source = Self::default();
            source.revision.store(revision, Ordering::SeqCst);
            source
        }

        pub(crate) fn add_listing(&self, url: &str, entries: &[(&str, EntryKind)]) {
            let entries = entries
                .iter()
                .map(|(name, kind)| {
                    (
                        name.to_string(),
                        ChildEntry {
                            kind: *kind,
                            revision: 1,
                            commit_date: Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap(),
                        },
                    )
                })
                .collect();
            self.listings
                .lock()
                .insert(url.to_string(), DirectoryListing { entries });
        }

        fn failure(url: &str) -> InfoError {
            InfoError::ExternalTool {
                command: format!("svn info --xml {url}"),
                status: crate::error::ExitStatusDisplay(Some(1)),
                output: "svn: E170013: Unable to connect".to_string(),
            }
        }
    }

    #[async_trait]
    impl InfoSource for FakeSource {
        async fn latest_revision(&self, url: &str) -> Result<u64, InfoError> {
            self.revision_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(Self::failure(url));
            }
            Ok(self.revision.load(Ordering::SeqCst))
        }

        async fn child_directories(&self, url: &str) -> Result<DirectoryListing, InfoError> {
            self.listing_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(Self::failure(url));
            }
            Ok(self.listings.lock().get(url).cloned().unwrap_or_default())
        }
    }

    fn cache_with(source: Arc<FakeSource>) -> (RevisionCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (RevisionCache::new(store.clone(), source), store)
    }

    const URL: &str = "http://host/modules/blog/trunk";

    #[tokio::test]
    async fn test_cached_revision_skips_source() {
        let source = Arc::new(FakeSource::with_revision(42));
        let (cache, _) = cache_with(source.clone());

        assert_eq!(cache.latest_revision(URL).await.unwrap(), 42);
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 1);

        source.revision.store(43, Ordering::SeqCst);
        assert_eq!(cache.latest_revision(URL).await.unwrap(), 42);
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 1);

        let record = cache.get(URL).await.unwrap();
        assert!(!record.needs_revision_refresh);
        assert!(record.refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_updates_and_clears_flag() {
        let source = Arc::new(FakeSource::with_revision(42));
        let (cache, store) = cache_with(source.clone());
        cache.latest_revision(URL).await.unwrap();

        source.revision.store(50, Ordering::SeqCst);
        let mut record = cache.get(URL).await.unwrap();
        record.needs_revision_refresh = true;
        store.write(&record).await.unwrap();

        let outcome = cache.refresh(URL).await.unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.record.latest_revision, Some(50));
        assert!(!outcome.record.needs_revision_refresh);
        assert_eq!(cache.latest_revision(URL).await.unwrap(), 50);
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_value_and_keeps_flag() {
        let source = Arc::new(FakeSource::with_revision(42));
        let (cache, _) = cache_with(source.clone());
        cache.latest_revision(URL).await.unwrap();

        source.failing.store(true, Ordering::SeqCst);
        let summary = cache.refresh_all().await.unwrap();
        assert_eq!(summary, RefreshSummary { refreshed: 0, failed: 1 });

        let record = cache.get(URL).await.unwrap();
        assert!(record.needs_revision_refresh);
        assert!(record.needs_child_dir_refresh);
        assert_eq!(record.latest_revision, Some(42));

        // Flag still set, so the next read retries and falls back to stale
        assert_eq!(cache.latest_revision(URL).await.unwrap(), 42);
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 3);

        source.failing.store(false, Ordering::SeqCst);
        source.revision.store(44, Ordering::SeqCst);
        assert_eq!(cache.latest_revision(URL).await.unwrap(), 44);
        assert!(!cache.get(URL).await.unwrap().needs_revision_refresh);
    }

    #[tokio::test]
    async fn test_first_fetch_failure_is_an_error() {
        let source = Arc::new(FakeSource::with_revision(42));
        source.failing.store(true, Ordering::SeqCst);
        let (cache, _) = cache_with(source.clone());

        let err = cache.latest_revision(URL).await.unwrap_err();
        assert!(matches!(err, CacheError::Info(InfoError::ExternalTool { .. })));
        assert!(cache.get(URL).await.unwrap().needs_revision_refresh);
    }

    #[tokio::test]
    async fn test_refresh_all_touches_every_url() {
        let source = Arc::new(FakeSource::with_revision(7));
        let (cache, _) = cache_with(source.clone());
        cache.get("http://host/a/trunk").await.unwrap();
        cache.get("http://host/b/trunk").await.unwrap();

        let summary = cache.refresh_all().await.unwrap();
        assert_eq!(summary, RefreshSummary { refreshed: 2, failed: 0 });
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.listing_calls.load(Ordering::SeqCst), 2);

        let record = cache.get("http://host/b/trunk").await.unwrap();
        assert_eq!(record.latest_revision, Some(7));
        assert_eq!(record.child_directories, Some(BTreeMap::new()));
    }

    #[tokio::test]
    async fn test_refresh_without_flags_does_not_query() {
        let source = Arc::new(FakeSource::with_revision(7));
        let (cache, _) = cache_with(source.clone());

        let outcome = cache.refresh(URL).await.unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.record.latest_revision, None);
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_picks_up_new_revision() {
        let source = Arc::new(FakeSource::with_revision(7));
        let (cache, _) = cache_with(source.clone());
        assert_eq!(cache.latest_revision(URL).await.unwrap(), 7);

        source.revision.store(9, Ordering::SeqCst);
        let outcome = cache.force_refresh(URL).await.unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.record.latest_revision, Some(9));
        assert_eq!(cache.latest_revision(URL).await.unwrap(), 9);
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_child_directories_are_cached() {
        let source = Arc::new(FakeSource::with_revision(7));
        source.add_listing("http://host/blog/tags", &[("0.1", EntryKind::Dir)]);
        let (cache, _) = cache_with(source.clone());

        let children = cache.child_directories("http://host/blog/tags").await.unwrap();
        assert_eq!(children.keys().collect::<Vec<_>>(), vec!["0.1"]);
        cache.child_directories("http://host/blog/tags").await.unwrap();
        assert_eq!(source.listing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tree_stops_at_leaf_instances() {
        let source = Arc::new(FakeSource::with_revision(7));
        source.add_listing(
            "http://host/blog",
            &[("tags", EntryKind::Dir), ("trunk", EntryKind::Dir)],
        );
        source.add_listing(
            "http://host/blog/tags",
            &[("0.1", EntryKind::Dir), ("0.2", EntryKind::Dir)],
        );
        source.add_listing(
            "http://host/blog/trunk",
            &[("code", EntryKind::Dir), ("README", EntryKind::File)],
        );
        source.add_listing("http://host/blog/tags/0.1", &[("_config.php", EntryKind::File)]);
        source.add_listing("http://host/blog/tags/0.2", &[("_config.php", EntryKind::File)]);
        let (cache, _) = cache_with(source);

        let tree = cache.tree("http://host/blog/", 5).await.unwrap();
        let leaf = |name: &str| RepositoryTree::Leaf(name.to_string());
        let expected = RepositoryTree::Container(BTreeMap::from([
            (
                "tags".to_string(),
                RepositoryTree::Container(BTreeMap::from([
                    ("0.1".to_string(), leaf("0.1")),
                    ("0.2".to_string(), leaf("0.2")),
                ])),
            ),
            ("trunk".to_string(), leaf("trunk")),
        ]));
        assert_eq!(tree, expected);

        let shallow = cache.tree("http://host/blog", 1).await.unwrap();
        assert_eq!(
            shallow,
            RepositoryTree::Container(BTreeMap::from([
                ("tags".to_string(), leaf("tags")),
                ("trunk".to_string(), leaf("trunk")),
            ]))
        );
    }
}
