//! Background poller: fetches an unread batch every interval and triages it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::pipeline::processor::TriageProcessor;

/// Spawn the polling loop. Runs a batch immediately, then every `interval`.
///
/// Returns the task handle and a shutdown flag checked before each batch.
pub fn spawn_triage_poller(
    processor: Arc<TriageProcessor>,
    interval: Duration,
    batch_size: usize,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Triage poller started");

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Triage poller shutting down");
                return;
            }

            if let Err(e) = processor.run_once(batch_size).await {
                error!(error = %e, "Failed to fetch unread batch");
            }
        }
    });

    (handle, shutdown_flag)
}
