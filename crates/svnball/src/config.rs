use std::path::PathBuf;
use std::time::Duration;

use crate::build::{CacheLayout, WaitPolicy};

/// Configurable options for the archiver
#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    /// Directory the finished archives are written to
    pub cache_dir: PathBuf,

    /// URL prefix under which `cache_dir` is served
    pub cache_public_url_prefix: String,

    /// Directory holding export folders of in-progress builds
    pub temp_dir: PathBuf,

    /// Replaces the module name at the start of every archive name
    pub base_filename_override: Option<String>,

    pub svn_binary: PathBuf,

    pub tar_binary: PathBuf,

    /// Limit for each external command (query, export or compress)
    pub command_timeout: Duration,

    /// Delay between checks while another worker builds the same archive
    pub poll_interval: Duration,

    /// Checks before building anyway
    pub max_wait_polls: u32,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("assets/downloads"),
            cache_public_url_prefix: "/assets/downloads".to_owned(),
            temp_dir: std::env::temp_dir().join("svnball"),
            base_filename_override: None,
            svn_binary: PathBuf::from("svn"),
            tar_binary: PathBuf::from("tar"),
            command_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            max_wait_polls: 120,
        }
    }
}

impl ArchiverConfig {
    pub fn builder() -> crate::builder::ArchiverConfigBuilder {
        crate::builder::ArchiverConfigBuilder::new()
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(&self.cache_dir, &self.temp_dir)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: self.poll_interval,
            max_polls: self.max_wait_polls,
        }
    }
}
