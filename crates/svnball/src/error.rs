use std::path::PathBuf;
use std::time::Duration;

use crate::build::PipelineStage;

/// Failures of the read-only `svn` queries.
///
/// Both kinds are recoverable: the revision cache keeps serving its previous
/// value and retries on the next access.
#[derive(Debug, thiserror::Error)]
pub enum InfoError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    ExternalTool {
        command: String,
        status: ExitStatusDisplay,
        output: String,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("unexpected svn output: {0}")]
    Parse(String),
}

/// Exit status of a finished subprocess, `None` when it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatusDisplay(pub Option<i32>);

impl std::fmt::Display for ExitStatusDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(code) => write!(f, "status {code}"),
            None => f.write_str("a signal"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Info(#[from] InfoError),

    #[error("revision store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error("cannot determine revision: {0}")]
    Cache(#[from] CacheError),

    #[error("refusing unsafe archive file name {0:?}")]
    UnsafeFileName(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("couldn't create directory {}: {source}", path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} stage failed ({status}): {output}")]
    PipelineFailed {
        stage: PipelineStage,
        status: ExitStatusDisplay,
        output: String,
    },

    #[error("build task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to whoever asked for an archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid repository URL: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
