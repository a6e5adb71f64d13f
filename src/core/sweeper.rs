//! Periodic eviction of old job records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::jobs::JobStore;

/// Spawn the background sweep loop. It runs `sweep(retention)` every
/// `interval` until `cancel` fires.
pub fn spawn_sweeper(
    jobs: Arc<dyn JobStore>,
    interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first sweep
        // happens one full interval after startup.
        ticker.tick().await;

        info!(
            interval_secs = interval.as_secs(),
            retention_secs = retention.as_secs(),
            "Job sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = jobs.sweep(retention);
                    debug!(removed, remaining = jobs.len(), "Sweep cycle finished");
                }
                _ = cancel.cancelled() => {
                    info!("Job sweeper stopped");
                    break;
                }
            }
        }
    })
}
