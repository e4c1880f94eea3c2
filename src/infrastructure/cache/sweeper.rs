//! Periodic background sweep for the in-memory cache

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::Cache;

/// Fixed-interval background task that purges expired cache entries so
/// memory stays bounded even without reads.
///
/// The sweeper's lifecycle belongs to the process entry point: start it
/// next to the cache it owns and call [`CacheSweeper::stop`] at shutdown
/// so the timer is not leaked.
#[derive(Debug)]
pub struct CacheSweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    /// Spawns the sweep task. The first sweep runs one full interval after
    /// start.
    pub fn start(cache: Arc<dyn Cache>, interval: Duration) -> Self {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so sweeps start
            // one interval in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match cache.purge_expired().await {
                            Ok(purged) if purged > 0 => {
                                debug!(purged, "cache sweep removed expired entries");
                            }
                            Ok(_) => {}
                            Err(error) => {
                                warn!(error = %error, "cache sweep failed");
                            }
                        }
                    }
                    _ = signal.changed() => break,
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Signals the task to stop and waits for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
