//! # Builder for ArchiverConfig
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use svnball_engine::ArchiverConfig;
//!
//! let config = ArchiverConfig::builder()
//!     .with_cache_dir("/srv/www/assets/downloads")
//!     .with_cache_public_url_prefix("https://example.com/assets/downloads")
//!     .with_temp_dir("/var/tmp/svnball")
//!     .with_base_filename("silverstripe-blog")
//!     .with_command_timeout(Duration::from_secs(600))
//!     .build();
//!
//! assert_eq!(config.max_wait_polls, 120);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::ArchiverConfig;

/// Builder for creating ArchiverConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct ArchiverConfigBuilder {
    config: ArchiverConfig,
}

impl ArchiverConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ArchiverConfig::default(),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Trailing slashes are dropped so names can be appended with one `/`
    pub fn with_cache_public_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.config.cache_public_url_prefix = prefix.trim_end_matches('/').to_owned();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn with_base_filename(mut self, base: impl Into<String>) -> Self {
        self.config.base_filename_override = Some(base.into());
        self
    }

    pub fn with_base_filename_option(mut self, base: Option<String>) -> Self {
        self.config.base_filename_override = base;
        self
    }

    pub fn with_svn_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.svn_binary = path.into();
        self
    }

    pub fn with_tar_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tar_binary = path.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn with_wait(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.config.poll_interval = poll_interval;
        self.config.max_wait_polls = max_polls;
        self
    }

    pub fn build(self) -> ArchiverConfig {
        self.config
    }
}

impl Default for ArchiverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
