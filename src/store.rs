use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::models::{FirewallRule, NetworkEvent, Snapshot};

/// Storage-side TTL backstop on snapshots, independent of the retention
/// manager's own horizon.
const SNAPSHOT_BACKSTOP: std::time::Duration = std::time::Duration::from_secs(30 * 24 * 3600);

/// Bucket-key shape used when grouping events into time slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKeyKind {
    /// `HH:00` hour-of-day labels (24h period).
    HourOfDay,
    /// `YYYY-MM-DD` calendar-date labels (7d/30d periods).
    CalendarDate,
}

impl BucketKeyKind {
    /// Format string, valid both for chrono and for Mongo's `$dateToString`.
    pub fn format(&self) -> &'static str {
        match self {
            BucketKeyKind::HourOfDay => "%H:00",
            BucketKeyKind::CalendarDate => "%Y-%m-%d",
        }
    }

    pub fn label(&self, t: DateTime<Utc>) -> String {
        t.format(self.format()).to_string()
    }
}

/// One grouped row out of the event store: counts for a single bucket key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBucketGroup {
    pub key: String,
    pub total: u64,
    pub blocked: u64,
    pub allowed: u64,
    pub threats: u64,
}

/// Append-only store of network events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &NetworkEvent) -> Result<()>;
    async fn append_many(&self, events: &[NetworkEvent]) -> Result<()>;
    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64>;
    async fn count_blocked_since(&self, since: DateTime<Utc>) -> Result<u64>;
    async fn count_threats_since(&self, since: DateTime<Utc>) -> Result<u64>;
    /// Events with `timestamp >= since`, grouped by bucket key. Sparse: only
    /// keys that actually have events appear.
    async fn grouped_counts(
        &self,
        since: DateTime<Utc>,
        key: BucketKeyKind,
    ) -> Result<Vec<RawBucketGroup>>;
    /// Newest `limit` events, timestamp descending.
    async fn recent(&self, limit: usize) -> Result<Vec<NetworkEvent>>;
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn is_empty(&self) -> Result<bool>;
}

/// Append-only store of periodic snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn append(&self, snapshot: &Snapshot) -> Result<()>;
    async fn latest(&self) -> Result<Option<Snapshot>>;
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn is_empty(&self) -> Result<bool>;
}

/// The slice of the (externally owned) firewall-rule store the telemetry core
/// needs: active-rule counting and first-run catalog seeding.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn count_active(&self) -> Result<u64>;
    async fn is_empty(&self) -> Result<bool>;
    async fn insert_defaults(&self, rules: &[FirewallRule]) -> Result<()>;
}

/// MongoDB-backed stores, sharing one database handle.
#[derive(Clone)]
pub struct MongoStores {
    database: Database,
    events: Collection<NetworkEvent>,
    snapshots: Collection<Snapshot>,
    rules: Collection<FirewallRule>,
}

impl MongoStores {
    pub async fn connect(config: &TelemetryConfig) -> Result<Self> {
        let options = ClientOptions::parse(&config.mongodb_uri).await?;
        let client = Client::with_options(options)?;
        let db = client.database(&config.database);

        Ok(Self {
            database: db.clone(),
            events: db.collection("events"),
            snapshots: db.collection("snapshots"),
            rules: db.collection("rules"),
        })
    }

    pub fn database(&self) -> Database {
        self.database.clone()
    }

    /// Descending timestamp indexes on both stores ("most recent N" and
    /// window scans), plus the snapshot TTL backstop.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.events
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "timestamp": -1 })
                    .build(),
            )
            .await?;
        self.snapshots
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "timestamp": -1 })
                    .build(),
            )
            .await?;
        self.snapshots
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "timestamp": 1 })
                    .options(
                        IndexOptions::builder()
                            .expire_after(SNAPSHOT_BACKSTOP)
                            .build(),
                    )
                    .build(),
            )
            .await?;
        self.snapshots
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "devices.ip": 1 })
                    .build(),
            )
            .await?;
        Ok(())
    }
}

fn since_filter(since: DateTime<Utc>) -> Document {
    doc! { "timestamp": { "$gte": bson::DateTime::from_chrono(since) } }
}

fn count_field(doc: &Document, key: &str) -> u64 {
    match doc.get(key) {
        Some(Bson::Int32(v)) => *v as u64,
        Some(Bson::Int64(v)) => *v as u64,
        Some(Bson::Double(v)) => *v as u64,
        _ => 0,
    }
}

#[async_trait]
impl EventStore for MongoStores {
    async fn append(&self, event: &NetworkEvent) -> Result<()> {
        self.events.insert_one(event).await?;
        Ok(())
    }

    async fn append_many(&self, events: &[NetworkEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.events.insert_many(events).await?;
        Ok(())
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self.events.count_documents(since_filter(since)).await?)
    }

    async fn count_blocked_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let mut filter = since_filter(since);
        filter.insert("action", "blocked");
        Ok(self.events.count_documents(filter).await?)
    }

    async fn count_threats_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let mut filter = since_filter(since);
        filter.insert("threat.detected", true);
        Ok(self.events.count_documents(filter).await?)
    }

    async fn grouped_counts(
        &self,
        since: DateTime<Utc>,
        key: BucketKeyKind,
    ) -> Result<Vec<RawBucketGroup>> {
        let pipeline = [
            doc! { "$match": since_filter(since) },
            doc! { "$group": {
                "_id": { "$dateToString": { "format": key.format(), "date": "$timestamp" } },
                "total": { "$sum": 1 },
                "blocked": { "$sum": { "$cond": [{ "$eq": ["$action", "blocked"] }, 1, 0] } },
                "allowed": { "$sum": { "$cond": [{ "$eq": ["$action", "allowed"] }, 1, 0] } },
                "threats": { "$sum": { "$cond": ["$threat.detected", 1, 0] } },
            }},
        ];

        let mut cursor = self.events.aggregate(pipeline).await?;
        let mut groups = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            groups.push(RawBucketGroup {
                key: doc.get_str("_id").unwrap_or_default().to_string(),
                total: count_field(&doc, "total"),
                blocked: count_field(&doc, "blocked"),
                allowed: count_field(&doc, "allowed"),
                threats: count_field(&doc, "threats"),
            });
        }
        Ok(groups)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<NetworkEvent>> {
        let cursor = self
            .events
            .find(doc! {})
            .sort(doc! { "timestamp": -1 })
            .limit(limit as i64)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = self
            .events
            .delete_many(doc! { "timestamp": { "$lt": bson::DateTime::from_chrono(cutoff) } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.events.count_documents(doc! {}).await? == 0)
    }
}

#[async_trait]
impl SnapshotStore for MongoStores {
    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.insert_one(snapshot).await?;
        Ok(())
    }

    async fn latest(&self) -> Result<Option<Snapshot>> {
        Ok(self
            .snapshots
            .find_one(doc! {})
            .sort(doc! { "timestamp": -1 })
            .await?)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = self
            .snapshots
            .delete_many(doc! { "timestamp": { "$lt": bson::DateTime::from_chrono(cutoff) } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.snapshots.count_documents(doc! {}).await? == 0)
    }
}

#[async_trait]
impl RuleStore for MongoStores {
    async fn count_active(&self) -> Result<u64> {
        Ok(self.rules.count_documents(doc! { "enabled": true }).await?)
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.rules.count_documents(doc! {}).await? == 0)
    }

    async fn insert_defaults(&self, rules: &[FirewallRule]) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }
        self.rules.insert_many(rules).await?;
        Ok(())
    }
}
