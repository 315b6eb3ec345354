use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::aggregator::{expected_labels, Period};
use crate::devices::DeviceDiscovery;
use crate::error::Result;
use crate::models::{HourlyActivity, Snapshot, SystemStatus};
use crate::store::{EventStore, RuleStore, SnapshotStore};

/// Builds one snapshot per invocation from live store counts, rule/device
/// state and the trailing-24h activity summary, then appends it in a single
/// write. Never mutates existing snapshots.
pub struct SnapshotCollector {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    rules: Arc<dyn RuleStore>,
    devices: Arc<dyn DeviceDiscovery>,
    started_at: Instant,
}

impl SnapshotCollector {
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        rules: Arc<dyn RuleStore>,
        devices: Arc<dyn DeviceDiscovery>,
    ) -> Self {
        Self {
            events,
            snapshots,
            rules,
            devices,
            started_at: Instant::now(),
        }
    }

    pub async fn collect_snapshot(&self) -> Result<Snapshot> {
        self.collect_at(Utc::now()).await
    }

    /// The whole snapshot is constructed before the single append; a failed
    /// read abandons the collection with no partial write.
    pub(crate) async fn collect_at(&self, now: DateTime<Utc>) -> Result<Snapshot> {
        let hour_ago = now - Duration::hours(1);
        let (total, blocked, threats, active_rules) = futures::try_join!(
            self.events.count_since(hour_ago),
            self.events.count_blocked_since(hour_ago),
            self.events.count_threats_since(hour_ago),
            self.rules.count_active(),
        )?;

        let devices = self.devices.connected_devices().await?;
        let hourly_activity = self.hourly_activity(now).await?;

        let snapshot = Snapshot::new(
            now,
            total,
            blocked,
            threats,
            active_rules,
            devices,
            hourly_activity,
            SystemStatus {
                firewall_active: active_rules > 0,
                last_update: now,
                uptime_secs: self.started_at.elapsed().as_secs(),
            },
        );
        self.snapshots.append(&snapshot).await?;
        debug!(
            total = snapshot.total_connections,
            blocked = snapshot.blocked_connections,
            threats = snapshot.threats,
            "snapshot collected"
        );
        Ok(snapshot)
    }

    /// Dense 24-slot hour summary for the preceding day, zero-filled like an
    /// aggregation response.
    async fn hourly_activity(&self, now: DateTime<Utc>) -> Result<Vec<HourlyActivity>> {
        let period = Period::Day;
        let groups = self
            .events
            .grouped_counts(now - period.window(), period.key_kind())
            .await?;
        let by_key: HashMap<String, _> = groups
            .into_iter()
            .map(|g| (g.key.clone(), g))
            .collect();

        Ok(expected_labels(period, now)
            .into_iter()
            .map(|hour| match by_key.get(&hour) {
                Some(group) => HourlyActivity {
                    hour,
                    total: group.total,
                    blocked: group.blocked,
                },
                None => HourlyActivity {
                    hour,
                    total: 0,
                    blocked: 0,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, ConnectedDevice, DeviceStatus, NetworkEvent, Protocol};
    use crate::store::mem::{MemEventStore, MemRuleStore, MemSnapshotStore};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct FixedDevices(Vec<ConnectedDevice>);

    #[async_trait]
    impl DeviceDiscovery for FixedDevices {
        async fn connected_devices(&self) -> Result<Vec<ConnectedDevice>> {
            Ok(self.0.clone())
        }
    }

    fn device(now: DateTime<Utc>) -> ConnectedDevice {
        ConnectedDevice {
            ip: "192.168.1.20".to_string(),
            mac: "f0:18:98:3a:5b:21".to_string(),
            hostname: "workstation-01".to_string(),
            last_seen: now,
            status: DeviceStatus::Active,
        }
    }

    fn event(ts: DateTime<Utc>, action: Action) -> NetworkEvent {
        NetworkEvent::new(
            "192.168.1.20",
            "93.184.216.34",
            443,
            Protocol::Tcp,
            action,
            "r-default",
            512,
        )
        .unwrap()
        .with_timestamp(ts)
    }

    fn collector(
        events: Arc<MemEventStore>,
        snapshots: Arc<MemSnapshotStore>,
        rules: Arc<MemRuleStore>,
        now: DateTime<Utc>,
    ) -> SnapshotCollector {
        SnapshotCollector::new(events, snapshots, rules, Arc::new(FixedDevices(vec![device(now)])))
    }

    #[tokio::test]
    async fn counts_the_trailing_hour() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap();
        let events = Arc::new(MemEventStore::new());
        events
            .append_many(&[
                event(now - Duration::minutes(10), Action::Allowed),
                event(now - Duration::minutes(25), Action::Allowed),
                event(now - Duration::minutes(40), Action::Blocked),
                // outside the 1h counting window, inside the 24h summary
                event(now - Duration::hours(3), Action::Blocked),
            ])
            .await
            .unwrap();
        let snapshots = Arc::new(MemSnapshotStore::new());
        let rules = Arc::new(MemRuleStore::new());
        rules
            .insert_defaults(&[crate::models::FirewallRule::new("allow https", Action::Allowed)])
            .await
            .unwrap();

        let collector = collector(events, snapshots.clone(), rules, now);
        let snap = collector.collect_at(now).await.unwrap();

        assert_eq!(snap.total_connections, 3);
        assert_eq!(snap.blocked_connections, 1);
        assert_eq!(snap.allowed_connections, 2);
        assert_eq!(snap.threats, 0);
        assert_eq!(snap.active_rules, 1);
        assert!(snap.system.firewall_active);
        assert_eq!(snap.devices.len(), 1);
        assert_eq!(snapshots.len(), 1, "exactly one append");

        assert_eq!(snap.hourly_activity.len(), 24);
        let older_hour = snap
            .hourly_activity
            .iter()
            .find(|h| h.hour == "15:00")
            .unwrap();
        assert_eq!((older_hour.total, older_hour.blocked), (1, 1));
    }

    #[tokio::test]
    async fn empty_stores_yield_a_zero_snapshot() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap();
        let snapshots = Arc::new(MemSnapshotStore::new());
        let collector = collector(
            Arc::new(MemEventStore::new()),
            snapshots.clone(),
            Arc::new(MemRuleStore::new()),
            now,
        );

        let snap = collector.collect_at(now).await.unwrap();
        assert_eq!(snap.total_connections, 0);
        assert_eq!(snap.allowed_connections, 0);
        assert_eq!(snap.active_rules, 0);
        assert!(!snap.system.firewall_active);
        assert!(snap.hourly_activity.iter().all(|h| h.total == 0));
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn read_failure_leaves_no_partial_write() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap();
        let events = Arc::new(MemEventStore::new());
        events.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let snapshots = Arc::new(MemSnapshotStore::new());
        let collector = collector(events, snapshots.clone(), Arc::new(MemRuleStore::new()), now);

        assert!(collector.collect_at(now).await.is_err());
        assert_eq!(snapshots.len(), 0);
    }
}
