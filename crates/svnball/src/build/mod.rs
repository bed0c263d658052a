//! # Archive builds
//!
//! Turning a repository target into an archive on disk, coordinated across
//! independent worker processes through the filesystem alone.

mod coordinator;
mod pipeline;
mod state;

pub use coordinator::{BuildCoordinator, WaitPolicy};
pub use pipeline::{ArchivePipeline, BuildJob, PipelineStage, SvnTarPipeline};
pub use state::{ArtifactProbe, BuildState, CacheLayout};
