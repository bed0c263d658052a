use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use svnball_engine::{ArchiverConfig, DownloadTarget, FileStore, MemoryStore, RecordStore};

use crate::error::AppError;

pub const DEFAULT_CONFIG_FILE: &str = "svnball.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub archiver: ArchiverSection,
    pub server: ServerSection,
    pub cache: CacheSection,
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverSection {
    /// Where finished archives are stored
    pub cache_dir: PathBuf,

    /// URL prefix the cache directory is served under
    pub cache_public_url_prefix: String,

    /// Export folders of running builds
    pub temp_dir: PathBuf,

    /// Base name used instead of the module name
    pub base_filename: Option<String>,

    pub svn_binary: PathBuf,

    pub tar_binary: PathBuf,

    /// Limit for each svn or tar invocation, in seconds
    pub command_timeout_secs: u64,

    /// Delay between checks for another worker's build, in milliseconds
    pub poll_interval_ms: u64,

    pub max_wait_polls: u32,
}

impl Default for ArchiverSection {
    fn default() -> Self {
        let defaults = ArchiverConfig::default();
        Self {
            cache_dir: defaults.cache_dir,
            cache_public_url_prefix: defaults.cache_public_url_prefix,
            temp_dir: defaults.temp_dir,
            base_filename: defaults.base_filename_override,
            svn_binary: defaults.svn_binary,
            tar_binary: defaults.tar_binary,
            command_timeout_secs: defaults.command_timeout.as_secs(),
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            max_wait_polls: defaults.max_wait_polls,
        }
    }
}

impl ArchiverSection {
    pub fn to_config(&self) -> ArchiverConfig {
        ArchiverConfig::builder()
            .with_cache_dir(&self.cache_dir)
            .with_cache_public_url_prefix(&self.cache_public_url_prefix)
            .with_temp_dir(&self.temp_dir)
            .with_base_filename_option(self.base_filename.clone())
            .with_svn_binary(&self.svn_binary)
            .with_tar_binary(&self.tar_binary)
            .with_command_timeout(Duration::from_secs(self.command_timeout_secs))
            .with_wait(
                Duration::from_millis(self.poll_interval_ms),
                self.max_wait_polls,
            )
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,

    /// Path prefix of the archive link routes
    pub mount: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            mount: "/downloads".to_string(),
        }
    }
}

impl ServerSection {
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        self.bind
            .parse()
            .map_err(|e| AppError::Config(format!("invalid bind address {:?}: {e}", self.bind)))
    }

    /// The mount path with a leading and no trailing slash; empty for root.
    pub fn mount_path(&self) -> String {
        let trimmed = self.mount.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub store: StoreKind,

    /// Directory of the file store
    pub store_path: PathBuf,

    pub refresh_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            store: StoreKind::Memory,
            store_path: PathBuf::from(".svnball/revisions"),
            refresh_interval_secs: svnball_engine::cache::DEFAULT_REFRESH_INTERVAL.as_secs(),
        }
    }
}

impl CacheSection {
    pub fn open_store(&self) -> Arc<dyn RecordStore> {
        match self.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::File => Arc::new(FileStore::new(&self.store_path)),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// A named download offered over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub base_filename: Option<String>,
}

impl TargetConfig {
    pub fn to_download(&self) -> DownloadTarget {
        let download = DownloadTarget::new(&self.url);
        match &self.base_filename {
            Some(base) => download.with_base_filename(base),
            None => download,
        }
    }
}

impl AppConfig {
    /// Load the configuration file. A missing file yields the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self, AppError> {
        let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.cache.refresh_interval_secs == 0 {
            return Err(AppError::Config(
                "cache.refresh_interval_secs must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() || target.name.contains('/') {
                return Err(AppError::Config(format!(
                    "invalid target name {:?}",
                    target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate target name {:?}",
                    target.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.cache.store, StoreKind::Memory);
        assert_eq!(config.cache.refresh_interval_secs, 3600);
        assert_eq!(config.archiver.max_wait_polls, 120);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let config = AppConfig::parse(
            r#"
            [archiver]
            cache_dir = "/srv/www/assets/downloads"
            cache_public_url_prefix = "https://example.com/assets/downloads/"
            base_filename = "silverstripe"
            command_timeout_secs = 60

            [server]
            bind = "0.0.0.0:9000"
            mount = "/get/"

            [cache]
            store = "file"
            store_path = "/var/lib/svnball"

            [[targets]]
            name = "blog"
            url = "http://svn.example.com/modules/blog/trunk"

            [[targets]]
            name = "forum-0.1"
            url = "http://svn.example.com/modules/forum/tags/0.1"
            base_filename = "silverstripe-forum"
            "#,
        )
        .unwrap();

        let archiver = config.archiver.to_config();
        assert_eq!(archiver.cache_dir, PathBuf::from("/srv/www/assets/downloads"));
        assert_eq!(
            archiver.cache_public_url_prefix,
            "https://example.com/assets/downloads"
        );
        assert_eq!(archiver.command_timeout, Duration::from_secs(60));
        assert_eq!(archiver.base_filename_override.as_deref(), Some("silverstripe"));
        assert_eq!(archiver.poll_interval, Duration::from_secs(1));

        assert_eq!(config.server.bind_addr().unwrap().port(), 9000);
        assert_eq!(config.server.mount_path(), "/get");
        assert_eq!(config.cache.store, StoreKind::File);
        assert_eq!(config.cache.refresh_interval(), Duration::from_secs(3600));

        let forum = config.targets[1].to_download();
        assert_eq!(forum.target.url(), "http://svn.example.com/modules/forum/tags/0.1");
        assert_eq!(forum.base_filename.as_deref(), Some("silverstripe-forum"));
    }

    #[test]
    fn test_rejects_duplicate_targets() {
        let result = AppConfig::parse(
            r#"
            [[targets]]
            name = "blog"
            url = "http://svn.example.com/modules/blog/trunk"

            [[targets]]
            name = "blog"
            url = "http://svn.example.com/modules/blog/branches/1.0"
            "#,
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            AppConfig::parse("[server\nbind = 1"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_mount_path_normalization() {
        let mut server = ServerSection::default();
        assert_eq!(server.mount_path(), "/downloads");
        server.mount = "/".to_string();
        assert_eq!(server.mount_path(), "");
        server.mount = "archives".to_string();
        assert_eq!(server.mount_path(), "/archives");
    }
}
