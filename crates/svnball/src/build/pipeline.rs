//! The export → compress → publish → cleanup pipeline.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io;
use tracing::{debug, info, warn};

use crate::error::{BuildError, ExitStatusDisplay};
use crate::process::{RunError, ToolCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Export,
    Compress,
    Publish,
    Cleanup,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStage::Export => "export",
            PipelineStage::Compress => "compress",
            PipelineStage::Publish => "publish",
            PipelineStage::Cleanup => "cleanup",
        })
    }
}

/// Everything one build needs to know.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub url: String,
    /// Export folder name, also the top-level directory inside the archive
    pub folder: String,
    /// Shared in-progress marker for this archive name
    pub work_dir: PathBuf,
    /// This build's private directory inside `work_dir`
    pub scratch_dir: PathBuf,
    pub partial_path: PathBuf,
    pub archive_path: PathBuf,
}

impl BuildJob {
    /// Target of `svn export`.
    pub fn export_dir(&self) -> PathBuf {
        self.scratch_dir.join(&self.folder)
    }
}

#[async_trait]
pub trait ArchivePipeline: Send + Sync {
    /// Produce `job.archive_path`. On success this build's scratch directory
    /// is gone and the archive is complete; on failure nothing exists at the
    /// final path.
    async fn run(&self, job: &BuildJob) -> Result<(), BuildError>;
}

/// [`ArchivePipeline`] running `svn export` and `tar`.
#[derive(Debug, Clone)]
pub struct SvnTarPipeline {
    svn_binary: PathBuf,
    tar_binary: PathBuf,
    stage_timeout: Duration,
}

impl SvnTarPipeline {
    pub fn new(
        svn_binary: impl Into<PathBuf>,
        tar_binary: impl Into<PathBuf>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            svn_binary: svn_binary.into(),
            tar_binary: tar_binary.into(),
            stage_timeout,
        }
    }

    async fn run_stage(&self, stage: PipelineStage, cmd: ToolCommand) -> Result<(), BuildError> {
        let output = match cmd.run(self.stage_timeout).await {
            Ok(output) => output,
            Err(RunError::Spawn(e)) => {
                return Err(BuildError::PipelineFailed {
                    stage,
                    status: ExitStatusDisplay(None),
                    output: format!("failed to start {}: {e}", cmd.program().display()),
                });
            }
            Err(RunError::TimedOut) => {
                return Err(BuildError::PipelineFailed {
                    stage,
                    status: ExitStatusDisplay(None),
                    output: format!(
                        "`{}` timed out after {:?}",
                        cmd.display(),
                        self.stage_timeout
                    ),
                });
            }
        };

        if !output.success() {
            return Err(BuildError::PipelineFailed {
                stage,
                status: output.exit_status(),
                output: output.combined(),
            });
        }
        Ok(())
    }

    async fn export(&self, job: &BuildJob) -> Result<(), BuildError> {
        // Creates the shared marker too; an existing one is left as is
        fs::create_dir_all(&job.scratch_dir).await?;

        let cmd = ToolCommand::new(&self.svn_binary)
            .arg("export")
            .arg("--non-interactive")
            .arg("--quiet")
            .arg("--")
            .arg(&job.url)
            .arg(job.export_dir());

        let result = self.run_stage(PipelineStage::Export, cmd).await;
        if result.is_err() {
            let _ = discard(job).await;
        }
        result
    }

    async fn compress(&self, job: &BuildJob) -> Result<(), BuildError> {
        let cmd = ToolCommand::new(&self.tar_binary)
            .arg("-czf")
            .arg(&job.partial_path)
            .arg("-C")
            .arg(&job.scratch_dir)
            .arg(&job.folder);

        let result = self.run_stage(PipelineStage::Compress, cmd).await;
        if result.is_err() {
            let _ = fs::remove_file(&job.partial_path).await;
            let _ = discard(job).await;
        }
        result
    }

    async fn publish(&self, job: &BuildJob) -> Result<(), BuildError> {
        if let Err(e) = fs::rename(&job.partial_path, &job.archive_path).await {
            let _ = fs::remove_file(&job.partial_path).await;
            let _ = discard(job).await;
            return Err(BuildError::PipelineFailed {
                stage: PipelineStage::Publish,
                status: ExitStatusDisplay(None),
                output: format!(
                    "rename {} -> {}: {e}",
                    job.partial_path.display(),
                    job.archive_path.display()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ArchivePipeline for SvnTarPipeline {
    async fn run(&self, job: &BuildJob) -> Result<(), BuildError> {
        info!(url = %job.url, archive = ?job.archive_path, "Building archive");

        self.export(job).await?;
        debug!(export_dir = ?job.export_dir(), "Export finished");

        self.compress(job).await?;
        self.publish(job).await?;

        // The archive is already in place, so a leftover folder only costs disk
        if let Err(e) = discard(job).await {
            warn!(
                stage = %PipelineStage::Cleanup,
                path = ?job.scratch_dir,
                error = %e,
                "Failed to remove export folder"
            );
        }

        info!(archive = ?job.archive_path, "Archive ready");
        Ok(())
    }
}

/// Remove this build's scratch directory, then the marker once no other
/// build is using it.
async fn discard(job: &BuildJob) -> io::Result<()> {
    match fs::remove_dir_all(&job.scratch_dir).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        other => other?,
    }
    match fs::remove_dir(&job.work_dir).await {
        Ok(()) => Ok(()),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty => Ok(()),
            _ => Err(e),
        },
    }
}
