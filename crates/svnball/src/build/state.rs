//! Filesystem-backed build state.
//!
//! Worker processes don't talk to each other, so the directories are the
//! only shared lock: the archive file existing means Complete, the export
//! folder in the temp directory existing means InProgress. Each build
//! exports below its own subdirectory of that folder, so redundant builders
//! never touch each other's files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::naming::ArchiveName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Absent,
    InProgress,
    Complete,
}

/// Where archives and their export folders live.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    cache_dir: PathBuf,
    temp_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(cache_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn archive_path(&self, name: &ArchiveName) -> PathBuf {
        self.cache_dir.join(name.as_str())
    }

    pub fn work_dir(&self, name: &ArchiveName) -> PathBuf {
        self.temp_dir.join(name.work_folder())
    }

    /// A fresh per-build directory inside the work folder.
    pub fn scratch_dir(&self, name: &ArchiveName) -> PathBuf {
        self.work_dir(name).join(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Hidden, unique compress target next to the final path so the rename
    /// into place stays on one filesystem.
    pub fn partial_path(&self, name: &ArchiveName) -> PathBuf {
        self.cache_dir.join(format!(
            ".{}.{}.partial",
            name.as_str(),
            uuid::Uuid::new_v4().simple()
        ))
    }
}

/// The two predicates the coordinator decides on.
#[async_trait]
pub trait ArtifactProbe: Send + Sync {
    async fn archive_exists(&self, name: &ArchiveName) -> bool;

    async fn build_in_progress(&self, name: &ArchiveName) -> bool;

    async fn state(&self, name: &ArchiveName) -> BuildState {
        if self.archive_exists(name).await {
            BuildState::Complete
        } else if self.build_in_progress(name).await {
            BuildState::InProgress
        } else {
            BuildState::Absent
        }
    }
}

#[async_trait]
impl ArtifactProbe for CacheLayout {
    async fn archive_exists(&self, name: &ArchiveName) -> bool {
        path_exists(&self.archive_path(name)).await
    }

    async fn build_in_progress(&self, name: &ArchiveName) -> bool {
        path_exists(&self.work_dir(name)).await
    }
}

async fn path_exists(path: &Path) -> bool {
    match fs::try_exists(path).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(path = ?path, error = %e, "Cannot stat path, treating as absent");
            false
        }
    }
}
