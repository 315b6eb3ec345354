use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::debug;

use crate::error::Result;
use crate::models::{Action, NetworkEvent, Protocol, Severity};
use crate::store::EventStore;

/// Producer of events into the event store. The core invokes this on the
/// fine-grained sampling cadence without caring how events come to exist;
/// a real deployment wires the appliance's ingest path here.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn produce(&self) -> Result<()>;
}

/// Demo producer: writes a small random batch of plausible events per tick.
pub struct SyntheticEventProducer {
    events: Arc<dyn EventStore>,
}

impl SyntheticEventProducer {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl EventProducer for SyntheticEventProducer {
    async fn produce(&self) -> Result<()> {
        let batch = {
            let mut rng = rand::thread_rng();
            let count = rng.gen_range(0..=3);
            let now = Utc::now();
            (0..count)
                .map(|_| random_event(&mut rng, now))
                .collect::<Vec<_>>()
        };
        if batch.is_empty() {
            return Ok(());
        }
        debug!(count = batch.len(), "sampled synthetic events");
        self.events.append_many(&batch).await
    }
}

const LAN_HOSTS: &[&str] = &[
    "192.168.1.20",
    "192.168.1.21",
    "192.168.1.30",
    "192.168.1.41",
    "192.168.1.55",
];

const REMOTE_HOSTS: &[(&str, Option<&str>)] = &[
    ("93.184.216.34", Some("example.com")),
    ("142.250.72.14", Some("google.com")),
    ("151.101.1.140", Some("reddit.com")),
    ("104.16.132.229", Some("cloudflare.com")),
    ("185.199.108.153", Some("github.io")),
    ("203.0.113.88", None),
    ("198.51.100.23", None),
];

const SERVICES: &[(u16, Protocol)] = &[
    (443, Protocol::Tcp),
    (443, Protocol::Tcp),
    (80, Protocol::Tcp),
    (53, Protocol::Udp),
    (22, Protocol::Tcp),
    (123, Protocol::Udp),
    (25, Protocol::Tcp),
];

const THREAT_TYPES: &[(&str, Severity)] = &[
    ("port_scan", Severity::Medium),
    ("brute_force", Severity::High),
    ("malware_callback", Severity::Critical),
    ("dns_tunneling", Severity::High),
    ("policy_violation", Severity::Low),
];

/// Builds one plausible event at `timestamp`. Shared by the sampling
/// producer and the bootstrap seeder.
pub(crate) fn random_event(rng: &mut impl Rng, timestamp: DateTime<Utc>) -> NetworkEvent {
    let source = LAN_HOSTS[rng.gen_range(0..LAN_HOSTS.len())];
    let (destination, domain) = REMOTE_HOSTS[rng.gen_range(0..REMOTE_HOSTS.len())];
    let (port, protocol) = SERVICES[rng.gen_range(0..SERVICES.len())];
    let blocked = rng.gen_bool(0.2);
    let (action, rule_id) = if blocked {
        (Action::Blocked, "r-default-deny")
    } else {
        (Action::Allowed, "r-allow-outbound")
    };

    // Ports in SERVICES are all non-zero, so construction cannot fail.
    let mut event = NetworkEvent::new(
        source,
        destination,
        port,
        protocol,
        action,
        rule_id,
        rng.gen_range(64..65_536),
    )
    .expect("static service ports are valid")
    .with_timestamp(timestamp);

    if let Some(domain) = domain {
        event = event.with_domain(domain);
    }
    if blocked && rng.gen_bool(0.5) {
        let (threat_type, severity) = THREAT_TYPES[rng.gen_range(0..THREAT_TYPES.len())];
        event = event.with_threat(threat_type, severity);
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemEventStore;

    #[test]
    fn random_events_are_well_formed() {
        let mut rng = rand::thread_rng();
        let now = Utc::now();
        for _ in 0..200 {
            let event = random_event(&mut rng, now);
            assert!(event.port >= 1);
            assert_eq!(event.timestamp, now);
            if event.threat.detected {
                assert_eq!(event.action, Action::Blocked);
                assert!(event.threat.threat_type.is_some());
            }
        }
    }

    #[tokio::test]
    async fn producer_appends_at_most_a_small_batch() {
        let store = Arc::new(MemEventStore::new());
        let producer = SyntheticEventProducer::new(store.clone());
        producer.produce().await.unwrap();
        assert!(store.len() <= 3);
    }
}
