use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

use crate::error::Result;
use crate::store::{EventStore, SnapshotStore};

const DAILY: std::time::Duration = std::time::Duration::from_secs(24 * 3600);

/// Records deleted per store by one cleanup pass. A store whose delete
/// failed reports 0; the failure itself is logged where it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub events_deleted: u64,
    pub snapshots_deleted: u64,
}

/// Enforces the retention horizons: events past their TTL and snapshots past
/// a separate, longer TTL are deleted. The two stores are always attempted
/// independently.
pub struct RetentionManager {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    event_ttl_days: i64,
    snapshot_ttl_days: i64,
}

impl RetentionManager {
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        event_ttl_days: i64,
        snapshot_ttl_days: i64,
    ) -> Self {
        Self {
            events,
            snapshots,
            event_ttl_days,
            snapshot_ttl_days,
        }
    }

    pub async fn run_scheduled_cleanup(&self) -> CleanupReport {
        self.cleanup_at(Utc::now(), self.event_ttl_days).await
    }

    /// One-off cleanup with an overridden event TTL. The snapshot TTL is not
    /// overridden.
    pub async fn manual_cleanup(&self, days: i64) -> CleanupReport {
        self.cleanup_at(Utc::now(), days).await
    }

    pub(crate) async fn cleanup_at(&self, now: DateTime<Utc>, event_ttl_days: i64) -> CleanupReport {
        let events_deleted = match self
            .events
            .delete_older_than(now - Duration::days(event_ttl_days))
            .await
        {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(error = %e, "event cleanup failed");
                0
            }
        };

        let snapshots_deleted = match self
            .snapshots
            .delete_older_than(now - Duration::days(self.snapshot_ttl_days))
            .await
        {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(error = %e, "snapshot cleanup failed");
                0
            }
        };

        let report = CleanupReport {
            events_deleted,
            snapshots_deleted,
        };
        info!(
            events = report.events_deleted,
            snapshots = report.snapshots_deleted,
            "retention cleanup finished"
        );
        report
    }

    /// Daily cleanup cadence, alive for the life of the process.
    pub fn spawn_daily(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + DAILY, DAILY);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.run_scheduled_cleanup().await;
            }
        })
    }
}
