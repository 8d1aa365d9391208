//! Timer-driven garbage collection of expired pending verifications.
//!
//! An explicit sweep task bounds worst-case lookup latency; per-request
//! scanning is never needed because expired entries already behave as
//! absent on lookup.

use std::sync::Arc;
use std::time::Duration;

use keygate_core::PendingVerifications;
use tokio::task::JoinHandle;

/// Spawn the sweep task. Runs until the returned handle is aborted.
pub fn spawn_pending_sweeper(
    pending: Arc<PendingVerifications>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let swept = pending.sweep();
            if swept > 0 {
                tracing::debug!(swept, "Expired pending verifications removed");
            }
        }
    })
}
