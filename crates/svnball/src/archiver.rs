//! # Archiver
//!
//! The request-facing side: turns a configured download target into a link,
//! a built archive, or its size.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::build::{BuildCoordinator, SvnTarPipeline};
use crate::cache::{RecordStore, RevisionCache};
use crate::config::ArchiverConfig;
use crate::error::ArchiveError;
use crate::location::RepositoryTarget;
use crate::naming::{ArchiveName, ArchiveNamer, NamingScope};
use crate::svn::SvnClient;
use crate::utils::join_url;

/// Builds links to sub-actions of a handler.
pub trait LinkBuilder: Send + Sync {
    fn build_link(&self, parent: &str, action: &str, query: &[(&str, &str)]) -> String;
}

/// Slash-joins path segments and appends an URL-encoded query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinLinks;

impl LinkBuilder for JoinLinks {
    fn build_link(&self, parent: &str, action: &str, query: &[(&str, &str)]) -> String {
        let (base, existing_query) = match parent.split_once('?') {
            Some((base, q)) => (base, Some(q)),
            None => (parent, None),
        };

        let action = action.trim_matches('/');
        let mut link = if action.is_empty() {
            base.to_string()
        } else {
            join_url(base, action)
        };

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(query);
        let added = serializer.finish();

        let query: Vec<&str> = existing_query
            .into_iter()
            .chain(Some(added.as_str()))
            .filter(|q| !q.is_empty())
            .collect();
        if !query.is_empty() {
            link.push('?');
            link.push_str(&query.join("&"));
        }
        link
    }
}

/// One downloadable repository path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTarget {
    pub target: RepositoryTarget,
    /// Replaces the module name in the archive name
    pub base_filename: Option<String>,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            target: RepositoryTarget::new(url),
            base_filename: None,
        }
    }

    pub fn with_base_filename(mut self, base: impl Into<String>) -> Self {
        self.base_filename = Some(base.into());
        self
    }

    /// Same naming options, different repository URL.
    pub fn with_target(&self, target: RepositoryTarget) -> Self {
        Self {
            target,
            base_filename: self.base_filename.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedArchive {
    pub name: String,
    pub path: PathBuf,
    pub public_url: String,
}

pub struct Archiver {
    namer: ArchiveNamer,
    coordinator: Arc<BuildCoordinator>,
    public_prefix: String,
}

impl Archiver {
    pub fn new(
        namer: ArchiveNamer,
        coordinator: Arc<BuildCoordinator>,
        public_prefix: impl Into<String>,
    ) -> Self {
        Self {
            namer,
            coordinator,
            public_prefix: public_prefix.into(),
        }
    }

    /// Wire the svn-backed info source and pipeline from `config`.
    pub fn from_config(config: &ArchiverConfig, store: Arc<dyn RecordStore>) -> Self {
        let source = Arc::new(SvnClient::new(&config.svn_binary, config.command_timeout));
        let cache = Arc::new(RevisionCache::new(store, source));
        let namer = ArchiveNamer::new(cache, config.base_filename_override.clone());

        let pipeline = Arc::new(SvnTarPipeline::new(
            &config.svn_binary,
            &config.tar_binary,
            config.command_timeout,
        ));
        let coordinator = Arc::new(BuildCoordinator::with_layout(
            config.layout(),
            pipeline,
            config.wait_policy(),
        ));

        Self::new(namer, coordinator, config.cache_public_url_prefix.clone())
    }

    pub fn cache(&self) -> &Arc<RevisionCache> {
        self.namer.cache()
    }

    pub fn coordinator(&self) -> &Arc<BuildCoordinator> {
        &self.coordinator
    }

    /// Naming memo for one request.
    pub fn scope(&self) -> NamingScope<'_> {
        self.namer.scope()
    }

    /// URL prefix the cache directory is served under.
    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    pub fn public_url(&self, name: &ArchiveName) -> String {
        join_url(&self.public_prefix, name.as_str())
    }

    pub async fn archive_name(
        &self,
        scope: &mut NamingScope<'_>,
        download: &DownloadTarget,
    ) -> Result<ArchiveName, ArchiveError> {
        Ok(scope
            .resolve(&download.target, download.base_filename.as_deref())
            .await?)
    }

    /// Where a client should go to fetch the archive: the file itself when
    /// it is built, otherwise the `generate` action below `link`.
    pub async fn download_url(
        &self,
        scope: &mut NamingScope<'_>,
        download: &DownloadTarget,
        link: &str,
        links: &dyn LinkBuilder,
    ) -> Result<String, ArchiveError> {
        let name = self.archive_name(scope, download).await?;
        if self.coordinator.probe().archive_exists(&name).await {
            Ok(self.public_url(&name))
        } else {
            Ok(links.build_link(link, "generate", &[]))
        }
    }

    /// Build the archive if needed.
    pub async fn generate(
        &self,
        scope: &mut NamingScope<'_>,
        download: &DownloadTarget,
    ) -> Result<GeneratedArchive, ArchiveError> {
        let name = self.archive_name(scope, download).await?;
        let path = self
            .coordinator
            .ensure_archive(&download.target, &name)
            .await?;

        info!(url = %download.target, archive = %name, "Archive available");
        Ok(GeneratedArchive {
            public_url: self.public_url(&name),
            name: name.to_string(),
            path,
        })
    }

    /// Size in bytes, building the archive first if it doesn't exist.
    pub async fn file_size(
        &self,
        scope: &mut NamingScope<'_>,
        download: &DownloadTarget,
    ) -> Result<u64, ArchiveError> {
        let generated = self.generate(scope, download).await?;
        Ok(tokio::fs::metadata(&generated.path).await?.len())
    }
}
