//! Periodic eviction of stale job records.
//!
//! Spawned once at startup. Every `interval` it asks the [`StatusStore`]
//! to drop records older than the [`RetentionPolicy`] allows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::store::{RetentionPolicy, StatusStore};

/// Run the retention sweep loop until `cancel` is triggered.
pub async fn run(
    store: Arc<StatusStore>,
    policy: RetentionPolicy,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        terminal_ttl_secs = policy.terminal_ttl.num_seconds(),
        orphan_ttl_secs = policy.orphan_ttl.num_seconds(),
        interval_secs = interval.as_secs(),
        "Job retention sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = store.evict_expired(&policy, Utc::now()).await;
                if evicted > 0 {
                    let remaining = store.len().await;
                    tracing::info!(evicted, remaining, "Evicted stale job records");
                } else {
                    tracing::debug!("Job retention: nothing to evict");
                }
            }
        }
    }
}
