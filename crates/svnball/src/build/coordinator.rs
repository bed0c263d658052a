//! # Build Coordinator
//!
//! Makes sure an archive exists, building it at most once per name where
//! possible:
//!
//! 1. an existing archive is returned straight away;
//! 2. if another worker's export folder exists, poll for its archive for a
//!    bounded time, then give up and build anyway (a crashed builder leaves
//!    its folder behind forever);
//! 3. otherwise build, after re-checking that nobody finished meanwhile.
//!
//! The cross-process protocol is best effort. Two workers can still build
//! the same archive, which is wasteful but safe: each build exports into its
//! own scratch directory and publishes by atomic rename.
//!
//! Builds run on their own task, so a request that goes away mid-build
//! doesn't abort the export and leave the folder behind for others to wait on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::build::pipeline::{ArchivePipeline, BuildJob};
use crate::build::state::{ArtifactProbe, CacheLayout};
use crate::error::BuildError;
use crate::location::RepositoryTarget;
use crate::naming::ArchiveName;

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl WaitPolicy {
    /// Longest time spent waiting for another worker before building.
    pub fn max_wait(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_polls)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        }
    }
}

pub struct BuildCoordinator {
    layout: CacheLayout,
    probe: Arc<dyn ArtifactProbe>,
    pipeline: Arc<dyn ArchivePipeline>,
    wait: WaitPolicy,
    /// Per-archive gates so tasks of this process queue behind one build
    in_flight: Mutex<HashMap<ArchiveName, Arc<tokio::sync::Mutex<()>>>>,
}

impl BuildCoordinator {
    pub fn new(
        layout: CacheLayout,
        probe: Arc<dyn ArtifactProbe>,
        pipeline: Arc<dyn ArchivePipeline>,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            layout,
            probe,
            pipeline,
            wait,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Coordinator over the real filesystem.
    pub fn with_layout(
        layout: CacheLayout,
        pipeline: Arc<dyn ArchivePipeline>,
        wait: WaitPolicy,
    ) -> Self {
        let probe = Arc::new(layout.clone());
        Self::new(layout, probe, pipeline, wait)
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn probe(&self) -> &Arc<dyn ArtifactProbe> {
        &self.probe
    }

    /// Return the path of archive `name` for `target`, building it if needed.
    pub async fn ensure_archive(
        &self,
        target: &RepositoryTarget,
        name: &ArchiveName,
    ) -> Result<PathBuf, BuildError> {
        let archive_path = self.layout.archive_path(name);
        if self.probe.archive_exists(name).await {
            debug!(archive = %name, "Archive already built");
            return Ok(archive_path);
        }

        let gate = self.gate(name);
        let result = {
            let _guard = gate.lock().await;
            self.ensure_locked(target, name, archive_path).await
        };
        self.release_gate(name, &gate);
        result
    }

    async fn ensure_locked(
        &self,
        target: &RepositoryTarget,
        name: &ArchiveName,
        archive_path: PathBuf,
    ) -> Result<PathBuf, BuildError> {
        // A sibling task may have finished while we queued
        if self.probe.archive_exists(name).await {
            return Ok(archive_path);
        }

        if self.probe.build_in_progress(name).await && self.wait_for_archive(name).await {
            return Ok(archive_path);
        }

        if self.probe.archive_exists(name).await {
            return Ok(archive_path);
        }

        let cache_dir = self.layout.cache_dir();
        fs::create_dir_all(cache_dir)
            .await
            .map_err(|source| BuildError::DirectoryCreateFailed {
                path: cache_dir.to_path_buf(),
                source,
            })?;
        let temp_dir = self.layout.temp_dir();
        fs::create_dir_all(temp_dir)
            .await
            .map_err(|source| BuildError::DirectoryCreateFailed {
                path: temp_dir.to_path_buf(),
                source,
            })?;

        let job = BuildJob {
            url: target.url().to_string(),
            folder: name.work_folder().to_string(),
            work_dir: self.layout.work_dir(name),
            scratch_dir: self.layout.scratch_dir(name),
            partial_path: self.layout.partial_path(name),
            archive_path: archive_path.clone(),
        };
        let pipeline = self.pipeline.clone();
        let build = tokio::spawn(async move { pipeline.run(&job).await });

        if let Err(e) = build.await? {
            if !self.probe.archive_exists(name).await {
                return Err(e);
            }
            warn!(
                archive = %name,
                error = %e,
                "Build failed, using archive published by another worker"
            );
        }
        Ok(archive_path)
    }

    /// Poll for another worker's archive. `true` if it showed up in time.
    async fn wait_for_archive(&self, name: &ArchiveName) -> bool {
        let max_wait = self.wait.max_wait();
        info!(archive = %name, ?max_wait, "Another build is in progress, waiting");

        for _ in 0..self.wait.max_polls {
            tokio::time::sleep(self.wait.poll_interval).await;
            if self.probe.archive_exists(name).await {
                debug!(archive = %name, "Archive appeared while waiting");
                return true;
            }
        }

        warn!(archive = %name, "Gave up waiting for other build, building it here");
        false
    }

    fn gate(&self, name: &ArchiveName) -> Arc<tokio::sync::Mutex<()>> {
        self.in_flight
            .lock()
            .entry(name.clone())
            .or_default()
            .clone()
    }

    fn release_gate(&self, name: &ArchiveName, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        // Only the map and `gate` itself hold it: nobody else is queued
        if Arc::strong_count(gate) == 2
            && in_flight
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(current, gate))
        {
            in_flight.remove(name);
        }
    }
}
