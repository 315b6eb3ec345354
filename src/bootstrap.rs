use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{Action, FirewallRule, NetworkEvent, Protocol, Snapshot, SystemStatus};
use crate::producer::random_event;
use crate::store::{EventStore, RuleStore, SnapshotStore};

const SEED_SNAPSHOT_HOURS: i64 = 24;
const SEED_EVENT_COUNT: usize = 50;

/// Cold-start seeding. Demo snapshots/events are written only when the
/// snapshot store is empty (and the demo flag is on); the default rule
/// catalog is seeded independently whenever the rule store is empty. Both
/// gates make a second run a no-op.
pub struct BootstrapInitializer {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    rules: Arc<dyn RuleStore>,
    seed_demo_data: bool,
}

impl BootstrapInitializer {
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        rules: Arc<dyn RuleStore>,
        seed_demo_data: bool,
    ) -> Self {
        Self {
            events,
            snapshots,
            rules,
            seed_demo_data,
        }
    }

    pub async fn run(&self) -> Result<()> {
        self.seed_default_rules().await?;
        if !self.seed_demo_data {
            return Ok(());
        }
        if !self.snapshots.is_empty().await? {
            debug!("snapshot store already populated, skipping demo seed");
            return Ok(());
        }
        self.seed_history(Utc::now()).await
    }

    async fn seed_default_rules(&self) -> Result<()> {
        if !self.rules.is_empty().await? {
            return Ok(());
        }
        let catalog = default_rules();
        self.rules.insert_defaults(&catalog).await?;
        info!(rules = catalog.len(), "seeded default firewall rules");
        Ok(())
    }

    /// 24 back-dated hourly snapshots (oldest 23h ago through now) plus ~50
    /// events spread across the trailing day.
    pub(crate) async fn seed_history(&self, now: DateTime<Utc>) -> Result<()> {
        let (snapshots, events) = {
            let mut rng = rand::thread_rng();

            let snapshots: Vec<Snapshot> = (0..SEED_SNAPSHOT_HOURS)
                .rev()
                .map(|hours_back| {
                    let ts = now - Duration::hours(hours_back);
                    let total = rng.gen_range(80..400u64);
                    let blocked = rng.gen_range(0..total / 4);
                    Snapshot::new(
                        ts,
                        total,
                        blocked,
                        rng.gen_range(0..6),
                        default_rules().len() as u64,
                        vec![],
                        vec![],
                        SystemStatus {
                            firewall_active: true,
                            last_update: ts,
                            uptime_secs: 0,
                        },
                    )
                })
                .collect();

            let events: Vec<NetworkEvent> = (0..SEED_EVENT_COUNT)
                .map(|_| {
                    let ts = now - Duration::seconds(rng.gen_range(0..24 * 3600));
                    random_event(&mut rng, ts)
                })
                .collect();

            (snapshots, events)
        };

        for snapshot in &snapshots {
            self.snapshots.append(snapshot).await?;
        }
        self.events.append_many(&events).await?;
        info!(
            snapshots = snapshots.len(),
            events = events.len(),
            "seeded historical demo data"
        );
        Ok(())
    }
}

fn default_rules() -> Vec<FirewallRule> {
    vec![
        FirewallRule::new("Allow HTTPS", Action::Allowed)
            .with_protocol(Protocol::Tcp)
            .with_port(443),
        FirewallRule::new("Allow HTTP", Action::Allowed)
            .with_protocol(Protocol::Tcp)
            .with_port(80),
        FirewallRule::new("Allow DNS", Action::Allowed)
            .with_protocol(Protocol::Udp)
            .with_port(53),
        FirewallRule::new("Allow SSH (LAN only)", Action::Allowed)
            .with_protocol(Protocol::Tcp)
            .with_port(22),
        FirewallRule::new("Block Telnet", Action::Blocked)
            .with_protocol(Protocol::Tcp)
            .with_port(23),
        FirewallRule::new("Block SMB", Action::Blocked)
            .with_protocol(Protocol::Tcp)
            .with_port(445),
        FirewallRule::new("Default deny inbound", Action::Blocked),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::{MemEventStore, MemRuleStore, MemSnapshotStore};

    fn initializer(
        seed_demo: bool,
    ) -> (
        BootstrapInitializer,
        Arc<MemEventStore>,
        Arc<MemSnapshotStore>,
        Arc<MemRuleStore>,
    ) {
        let events = Arc::new(MemEventStore::new());
        let snapshots = Arc::new(MemSnapshotStore::new());
        let rules = Arc::new(MemRuleStore::new());
        let init = BootstrapInitializer::new(
            events.clone(),
            snapshots.clone(),
            rules.clone(),
            seed_demo,
        );
        (init, events, snapshots, rules)
    }

    #[tokio::test]
    async fn first_run_seeds_everything() {
        let (init, events, snapshots, rules) = initializer(true);
        init.run().await.unwrap();

        assert_eq!(snapshots.len(), 24);
        assert_eq!(events.len(), SEED_EVENT_COUNT);
        assert_eq!(rules.len(), default_rules().len());

        for snap in snapshots.all() {
            assert_eq!(
                snap.allowed_connections,
                snap.total_connections - snap.blocked_connections
            );
        }
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let (init, events, snapshots, rules) = initializer(true);
        init.run().await.unwrap();
        init.run().await.unwrap();

        assert_eq!(snapshots.len(), 24);
        assert_eq!(events.len(), SEED_EVENT_COUNT);
        assert_eq!(rules.len(), default_rules().len());
    }

    #[tokio::test]
    async fn non_empty_snapshot_store_skips_demo_seed() {
        let (init, events, snapshots, _rules) = initializer(true);
        let now = Utc::now();
        snapshots
            .append(&Snapshot::new(
                now,
                1,
                0,
                0,
                0,
                vec![],
                vec![],
                SystemStatus {
                    firewall_active: true,
                    last_update: now,
                    uptime_secs: 0,
                },
            ))
            .await
            .unwrap();

        init.run().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(events.len(), 0);
    }

    #[tokio::test]
    async fn rules_are_seeded_even_without_demo_data() {
        let (init, events, snapshots, rules) = initializer(false);
        init.run().await.unwrap();

        assert_eq!(snapshots.len(), 0);
        assert_eq!(events.len(), 0);
        assert_eq!(rules.len(), default_rules().len());
    }

    #[tokio::test]
    async fn seeded_events_sit_inside_the_trailing_day() {
        let (init, events, _snapshots, _rules) = initializer(true);
        let now = Utc::now();
        init.seed_history(now).await.unwrap();
        for event in events.all() {
            assert!(event.timestamp <= now);
            assert!(event.timestamp > now - Duration::hours(25));
        }
    }
}
