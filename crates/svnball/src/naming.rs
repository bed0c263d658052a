//! # Archive naming
//!
//! Archive file names double as the build cache key: tags are immutable and
//! named by version (`forum-v0.1.tar.gz`), everything else carries the
//! revision it was exported at (`blog-trunk-r42.tar.gz`).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::cache::RevisionCache;
use crate::error::NamingError;
use crate::location::{BranchKind, ParsedLocation, RepositoryTarget};

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// A validated archive file name, always a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveName(String);

impl ArchiveName {
    /// Format the name for `location`. `revision` is ignored for tags.
    pub fn for_location(
        location: &ParsedLocation,
        base_name: Option<&str>,
        revision: Option<u64>,
    ) -> Result<Self, NamingError> {
        let base = base_name.unwrap_or(&location.module);
        let name = match (location.kind, revision) {
            (BranchKind::Tags, _) => format!("{base}-v{}{ARCHIVE_SUFFIX}", location.instance),
            (_, Some(revision)) => {
                format!("{base}-{}-r{revision}{ARCHIVE_SUFFIX}", location.instance)
            }
            (_, None) => format!("{base}-{}{ARCHIVE_SUFFIX}", location.instance),
        };
        Self::new(name)
    }

    pub fn new(name: impl Into<String>) -> Result<Self, NamingError> {
        let name = name.into();
        let unsafe_name = name.is_empty()
            || name.starts_with('.')
            || name.starts_with('-')
            || name
                .chars()
                .any(|c| matches!(c, '/' | '\\') || c.is_control());
        if unsafe_name {
            return Err(NamingError::UnsafeFileName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the export folder: the archive name without its suffix.
    pub fn work_folder(&self) -> &str {
        self.0.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArchiveName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves targets to archive names, consulting the revision cache for
/// anything that is not a tag.
#[derive(Clone)]
pub struct ArchiveNamer {
    cache: Arc<RevisionCache>,
    default_base_name: Option<String>,
}

impl ArchiveNamer {
    pub fn new(cache: Arc<RevisionCache>, default_base_name: Option<String>) -> Self {
        Self {
            cache,
            default_base_name,
        }
    }

    pub fn cache(&self) -> &Arc<RevisionCache> {
        &self.cache
    }

    /// Resolve without memoization. `base_name` overrides the configured
    /// default, which overrides the module name.
    pub async fn resolve(
        &self,
        target: &RepositoryTarget,
        base_name: Option<&str>,
    ) -> Result<ArchiveName, NamingError> {
        let location = ParsedLocation::parse(target);
        let base_name = base_name.or(self.default_base_name.as_deref());

        let revision = match location.kind {
            BranchKind::Tags => None,
            _ => Some(self.cache.latest_revision(target.url()).await?),
        };

        let name = ArchiveName::for_location(&location, base_name, revision)?;
        debug!(url = %target, archive = %name, "Resolved archive name");
        Ok(name)
    }

    /// A memo that lives for one request, so the revision can't change
    /// underneath it. Create a fresh scope per request.
    pub fn scope(&self) -> NamingScope<'_> {
        NamingScope {
            namer: self,
            resolved: HashMap::new(),
        }
    }
}

pub struct NamingScope<'a> {
    namer: &'a ArchiveNamer,
    resolved: HashMap<(RepositoryTarget, Option<String>), ArchiveName>,
}

impl NamingScope<'_> {
    pub async fn resolve(
        &mut self,
        target: &RepositoryTarget,
        base_name: Option<&str>,
    ) -> Result<ArchiveName, NamingError> {
        let key = (target.clone(), base_name.map(str::to_string));
        if let Some(name) = self.resolved.get(&key) {
            return Ok(name.clone());
        }

        let name = self.namer.resolve(target, base_name).await?;
        self.resolved.insert(key, name.clone());
        Ok(name)
    }
}
