use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, TelemetryError};
use crate::models::Bucket;
use crate::store::{BucketKeyKind, EventStore};

/// Aggregation window selector. Hour-wide buckets for 24h, day-wide for
/// 7d/30d.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn bucket_count(&self) -> usize {
        match self {
            Period::Day => 24,
            Period::Week => 7,
            Period::Month => 30,
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            Period::Day => Duration::hours(1),
            Period::Week | Period::Month => Duration::days(1),
        }
    }

    pub fn window(&self) -> Duration {
        self.step() * self.bucket_count() as i32
    }

    pub fn key_kind(&self) -> BucketKeyKind {
        match self {
            Period::Day => BucketKeyKind::HourOfDay,
            Period::Week | Period::Month => BucketKeyKind::CalendarDate,
        }
    }
}

impl FromStr for Period {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "24h" => Ok(Period::Day),
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            other => Err(TelemetryError::InvalidPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day => write!(f, "24h"),
            Period::Week => write!(f, "7d"),
            Period::Month => write!(f, "30d"),
        }
    }
}

/// The dense label sequence a response must cover, oldest first. Derived
/// purely from the reference time, never from which groups the store
/// returned.
pub(crate) fn expected_labels(period: Period, reference: DateTime<Utc>) -> Vec<String> {
    let kind = period.key_kind();
    let count = period.bucket_count() as i32;
    (0..count)
        .rev()
        .map(|offset| kind.label(reference - period.step() * offset))
        .collect()
}

/// On-demand, request-scoped bucketing of raw events. No caching: every call
/// recomputes from the store against the caller-supplied reference time.
pub struct Aggregator {
    events: Arc<dyn EventStore>,
}

impl Aggregator {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// Buckets events from `reference - window` to `reference` into exactly
    /// `period.bucket_count()` slots, zero-filling slots with no events.
    pub async fn aggregate(&self, period: Period, reference: DateTime<Utc>) -> Result<Vec<Bucket>> {
        let since = reference - period.window();
        let groups = self
            .events
            .grouped_counts(since, period.key_kind())
            .await?;
        let by_key: HashMap<String, _> = groups
            .into_iter()
            .map(|g| (g.key.clone(), g))
            .collect();

        Ok(expected_labels(period, reference)
            .into_iter()
            .map(|label| match by_key.get(&label) {
                Some(group) => Bucket {
                    label,
                    total: group.total,
                    blocked: group.blocked,
                    allowed: group.allowed,
                    threats: group.threats,
                },
                None => Bucket::zero(label),
            })
            .collect())
    }
}
