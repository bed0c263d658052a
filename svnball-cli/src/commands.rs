use std::collections::HashMap;
use std::sync::Arc;

use svnball_engine::utils::format_size;
use svnball_engine::{Archiver, DownloadTarget, PeriodicRefresher, RepositoryTarget};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::server::{self, AppState};

pub struct CommandExecutor {
    config: AppConfig,
    archiver: Arc<Archiver>,
    refresher: Arc<PeriodicRefresher>,
}

impl CommandExecutor {
    pub fn new(config: AppConfig) -> Self {
        let store = config.cache.open_store();
        let archiver = Arc::new(Archiver::from_config(&config.archiver.to_config(), store));
        let refresher = Arc::new(PeriodicRefresher::new(
            archiver.cache().clone(),
            config.cache.refresh_interval(),
        ));
        Self {
            config,
            archiver,
            refresher,
        }
    }

    fn download(
        &self,
        url: &str,
        base_filename: Option<String>,
    ) -> Result<DownloadTarget, AppError> {
        let target = RepositoryTarget::from_untrusted(url)?;
        Ok(DownloadTarget {
            target,
            base_filename,
        })
    }

    pub async fn serve(&self, bind: Option<String>) -> Result<(), AppError> {
        let mut server_config = self.config.server.clone();
        if let Some(bind) = bind {
            server_config.bind = bind;
        }
        let addr = server_config.bind_addr()?;

        let targets: HashMap<String, DownloadTarget> = self
            .config
            .targets
            .iter()
            .map(|target| (target.name.clone(), target.to_download()))
            .collect();
        if targets.is_empty() {
            warn!("No [[targets]] configured, only static downloads will be served");
        }

        let state = AppState::new(
            self.archiver.clone(),
            self.refresher.clone(),
            targets,
            server_config.mount_path(),
        );
        server::serve(state, addr).await
    }

    pub async fn resolve(&self, url: &str, base_filename: Option<String>) -> Result<(), AppError> {
        let download = self.download(url, base_filename)?;
        let mut scope = self.archiver.scope();
        let name = self.archiver.archive_name(&mut scope, &download).await?;
        println!("{name}");
        Ok(())
    }

    pub async fn generate(&self, url: &str, base_filename: Option<String>) -> Result<(), AppError> {
        let download = self.download(url, base_filename)?;
        let mut scope = self.archiver.scope();
        let generated = self.archiver.generate(&mut scope, &download).await?;
        let size = self.archiver.file_size(&mut scope, &download).await?;

        println!("{}", generated.path.display());
        println!("  name: {}", generated.name);
        println!("  url:  {}", generated.public_url);
        println!("  size: {}", format_size(size));
        Ok(())
    }

    pub async fn refresh(&self, url: Option<&str>) -> Result<(), AppError> {
        match url {
            Some(url) => {
                let target = RepositoryTarget::from_untrusted(url)?;
                let outcome = self.archiver.cache().force_refresh(target.url()).await?;
                let revision = outcome
                    .record
                    .latest_revision
                    .map_or_else(|| "unknown".to_string(), |r| r.to_string());
                println!("{target}: revision {revision}");
                for error in [&outcome.revision_error, &outcome.listing_error]
                    .into_iter()
                    .flatten()
                {
                    println!("  failed: {error}");
                }
            }
            None => {
                let summary = self.refresher.run_once().await?;
                info!(?summary, "Manual refresh finished");
                println!(
                    "{} refreshed, {} failed",
                    summary.refreshed, summary.failed
                );
            }
        }
        Ok(())
    }

    pub async fn tree(&self, url: &str, depth: usize) -> Result<(), AppError> {
        let target = RepositoryTarget::from_untrusted(url)?;
        let tree = self.archiver.cache().tree(target.url(), depth).await?;
        println!("{}", serde_json::to_string_pretty(&tree)?);
        Ok(())
    }
}
