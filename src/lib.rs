//! Telemetry core of a firewall administration dashboard: periodic snapshot
//! collection, time-bucketed analytics with gap filling, bounded retention,
//! and cold-start bootstrap over a MongoDB-backed event/snapshot store.
//!
//! The HTTP layer (see the `server` binary) is a thin consumer of this
//! library; authentication, rule CRUD and UI rendering live elsewhere.

pub mod aggregator;
pub mod bootstrap;
pub mod collector;
pub mod config;
pub mod devices;
pub mod error;
pub mod models;
pub mod producer;
pub mod retention;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use aggregator::{Aggregator, Period};
pub use bootstrap::BootstrapInitializer;
pub use collector::SnapshotCollector;
pub use config::TelemetryConfig;
pub use error::{Result, TelemetryError};
pub use models::{Bucket, NetworkEvent, Snapshot};
pub use retention::{CleanupReport, RetentionManager};
pub use scheduler::TelemetryScheduler;
pub use stats::StatsService;
pub use store::{EventStore, MongoStores, RuleStore, SnapshotStore};
