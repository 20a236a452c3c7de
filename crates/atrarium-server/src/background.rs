//! Background task for enforcing the post retention window.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::host::GroupHost;

/// Starts a background task that periodically evicts expired index rows.
///
/// This task runs indefinitely. The sweep is bounded work per group and
/// never blocks the read/write RPC paths: each group's actor is locked
/// only for its own delete.
///
/// # Arguments
///
/// * `host` - The group host.
/// * `interval_seconds` - Time in seconds to wait between sweeps.
/// * `retention_days` - Retention window measured from each post's own
///   creation time.
pub async fn start_retention_task(host: Arc<GroupHost>, interval_seconds: u64, retention_days: i64) {
    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(
        interval_seconds,
        retention_days,
        "starting post retention task"
    );

    loop {
        // Sleep first, letting startup settle before the first sweep.
        sleep(interval).await;

        match host.cleanup_all(retention_days).await {
            Ok((groups, deleted)) => {
                if deleted > 0 {
                    tracing::info!(groups, deleted, "evicted expired posts");
                } else {
                    tracing::debug!(groups, "no expired posts to evict");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "retention sweep failed");
            }
        }
    }
}
