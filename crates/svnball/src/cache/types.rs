//! # Cache Types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InfoError;
use crate::svn::ChildEntry;

/// Cached knowledge about one repository URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub url: String,
    pub latest_revision: Option<u64>,
    pub child_directories: Option<BTreeMap<String, ChildEntry>>,
    /// Set when the revision must be fetched again; cleared on success
    pub needs_revision_refresh: bool,
    pub needs_child_dir_refresh: bool,
    /// Last time any field was successfully refreshed
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl RevisionRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            latest_revision: None,
            child_directories: None,
            needs_revision_refresh: false,
            needs_child_dir_refresh: false,
            refreshed_at: None,
        }
    }

    pub fn has_pending_refresh(&self) -> bool {
        self.needs_revision_refresh || self.needs_child_dir_refresh
    }
}

/// Result of one refresh pass over a record.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub record: RevisionRecord,
    pub revision_error: Option<InfoError>,
    pub listing_error: Option<InfoError>,
}

impl RefreshOutcome {
    pub fn is_clean(&self) -> bool {
        self.revision_error.is_none() && self.listing_error.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

/// Branch layout below a URL, expanded through directories that only hold
/// other directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RepositoryTree {
    Leaf(String),
    Container(BTreeMap<String, RepositoryTree>),
}
