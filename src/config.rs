use std::env;
use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Runtime configuration, sourced from the environment with code defaults.
/// `dotenv` is loaded by the server binary before this is read.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mongodb_uri: String,
    pub database: String,
    pub snapshot_interval: Duration,
    pub sampling_interval: Duration,
    pub event_ttl_days: i64,
    pub snapshot_ttl_days: i64,
    pub seed_demo_data: bool,
    pub bind_addr: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            database: "warden".to_string(),
            snapshot_interval: Duration::from_secs(300),
            sampling_interval: Duration::from_secs(30),
            event_ttl_days: 30,
            snapshot_ttl_days: 90,
            seed_demo_data: true,
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mongodb_uri: env::var("MONGODB_URI").unwrap_or(defaults.mongodb_uri),
            database: env::var("WARDEN_DB").unwrap_or(defaults.database),
            snapshot_interval: Duration::from_secs(parse_or(
                "SNAPSHOT_INTERVAL_SECS",
                defaults.snapshot_interval.as_secs(),
            )),
            sampling_interval: Duration::from_secs(parse_or(
                "SAMPLING_INTERVAL_SECS",
                defaults.sampling_interval.as_secs(),
            )),
            event_ttl_days: parse_or("EVENT_TTL_DAYS", defaults.event_ttl_days),
            snapshot_ttl_days: parse_or("SNAPSHOT_TTL_DAYS", defaults.snapshot_ttl_days),
            seed_demo_data: parse_or("SEED_DEMO_DATA", defaults.seed_demo_data),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Debug,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw = %raw, default = ?default, "unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
