//! # Repository info source
//!
//! Read-only queries against a Subversion server. Nothing here caches; see
//! [`crate::cache::RevisionCache`] for that.

mod client;
pub mod xml;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InfoError;

pub use client::SvnClient;

#[cfg(all(test, unix))]
pub(crate) use client::tests::write_fake_svn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub kind: EntryKind,
    /// Last revision that changed this entry
    pub revision: u64,
    pub commit_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub entries: BTreeMap<String, ChildEntry>,
}

impl DirectoryListing {
    /// A listing made only of directories is a container of branches or
    /// tags. Anything holding a file is itself a leaf instance.
    pub fn is_branch_container(&self) -> bool {
        is_branch_container(&self.entries)
    }
}

pub(crate) fn is_branch_container(entries: &BTreeMap<String, ChildEntry>) -> bool {
    entries.values().all(|entry| entry.kind == EntryKind::Dir)
}

#[async_trait]
pub trait InfoSource: Send + Sync {
    /// Last changed revision of `url`.
    async fn latest_revision(&self, url: &str) -> Result<u64, InfoError>;

    /// Immediate children of `url`.
    async fn child_directories(&self, url: &str) -> Result<DirectoryListing, InfoError>;
}
