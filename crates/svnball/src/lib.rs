//! # Svnball
//!
//! Downloadable `.tar.gz` snapshots of Subversion repository paths, named
//! after the module, branch and revision they contain and built at most once.
//!
//! ## Features
//!
//! - Archive names derived from repository URLs and cached revisions
//! - Filesystem-coordinated builds shared by independent worker processes
//! - Revision cache with pluggable record stores and periodic refresh
//! - Hierarchical repository browsing for listing branches and tags

pub mod archiver;
pub mod build;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod location;
pub mod naming;
pub mod process;
pub mod svn;
pub mod utils;

pub use archiver::{Archiver, DownloadTarget, GeneratedArchive, JoinLinks, LinkBuilder};
pub use builder::ArchiverConfigBuilder;
pub use config::ArchiverConfig;
pub use error::{ArchiveError, BuildError, CacheError, InfoError, NamingError, StoreError};

pub use build::{BuildCoordinator, BuildState, CacheLayout, SvnTarPipeline, WaitPolicy};
pub use cache::{
    FileStore, MemoryStore, PeriodicRefresher, RecordStore, RefreshSummary, RepositoryTree,
    RevisionCache,
};
pub use location::{BranchKind, ParsedLocation, RepositoryTarget};
pub use naming::{ArchiveName, ArchiveNamer, NamingScope};
pub use svn::{InfoSource, SvnClient};
