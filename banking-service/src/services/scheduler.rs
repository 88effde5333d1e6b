use crate::services::sync::SyncWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Runs a sync cycle on a fixed interval until cancelled.
///
/// Cycles never overlap: a tick that fires while a cycle is still running is skipped.
pub struct SyncScheduler {
    worker: Arc<SyncWorker>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(worker: Arc<SyncWorker>, interval: Duration) -> Self {
        Self { worker, interval }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Starting bank sync scheduler"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Bank sync scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.worker.run_cycle().await {
                        tracing::error!(error = %e, "Scheduled sync cycle failed");
                    }
                }
            }
        }
    }
}
