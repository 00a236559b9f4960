//! Background compaction of long-expired hierarchy edges.

use chrono::Duration as ChronoDuration;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::hierarchy::HierarchyService;

/// Spawn a task that deletes edges expired for longer than `grace`, every `period`.
pub fn spawn_expired_edge_sweeper(
    service: HierarchyService,
    period: Duration,
    grace: ChronoDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            match service.compact_expired_edges(grace).await {
                Ok(0) => {}
                Ok(removed) => info!(removed = removed, "Compacted expired hierarchy edges"),
                Err(e) => warn!(error = %e, "Expired edge compaction failed"),
            }
        }
    })
}
