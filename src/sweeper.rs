use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;

/// Periodically returns tasks held by dead nodes to the pending queue.
pub struct ReclaimSweeper {
    coordinator: Arc<Coordinator>,
    interval: Duration,
}

impl ReclaimSweeper {
    pub fn new(coordinator: Arc<Coordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Reclaim sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Reclaim sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let reclaimed = self.coordinator.reclaim_orphaned().await;
                    if !reclaimed.is_empty() {
                        tracing::info!(count = reclaimed.len(), "Reclaim sweep requeued tasks");
                    }
                }
            }
        }
    }
}
