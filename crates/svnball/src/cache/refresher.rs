//! Background refresh of every cached URL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::manager::RevisionCache;
use crate::cache::types::RefreshSummary;
use crate::error::StoreResult;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

pub struct PeriodicRefresher {
    cache: Arc<RevisionCache>,
    interval: Duration,
}

impl PeriodicRefresher {
    pub fn new(cache: Arc<RevisionCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// One full pass; also serves manual refresh requests.
    pub async fn run_once(&self) -> StoreResult<RefreshSummary> {
        self.cache.refresh_all().await
    }

    /// Refresh every `interval` until `shutdown` fires. The first pass runs
    /// one interval after start.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?self.interval, "Periodic revision refresh started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(summary) => debug!(?summary, "Periodic refresh finished"),
                            Err(e) => warn!(error = %e, "Periodic refresh failed"),
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Periodic revision refresh stopped");
                        break;
                    }
                }
            }
        })
    }
}
