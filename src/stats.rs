use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Result, TelemetryError};
use crate::models::{Action, HourlyActivity, Severity, Snapshot};
use crate::store::{EventStore, SnapshotStore};

/// Latest snapshot projected for the dashboard, plus derived metrics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub timestamp: String,
    pub total_connections: u64,
    pub blocked_connections: u64,
    pub allowed_connections: u64,
    pub threats: u64,
    pub active_rules: u64,
    pub devices_online: usize,
    pub security_level: f64,
    pub growth_pct: f64,
    pub hourly_activity: Vec<HourlyActivity>,
    pub firewall_active: bool,
    pub uptime_secs: u64,
}

/// One recent event in display shape.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub time: String,
    pub source: String,
    pub destination: String,
    pub domain: Option<String>,
    pub port: u16,
    pub action: Action,
    pub threat: bool,
    pub severity: Option<Severity>,
}

/// Read-side queries backing the dashboard endpoints.
pub struct StatsService {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl StatsService {
    pub fn new(events: Arc<dyn EventStore>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { events, snapshots }
    }

    pub async fn summary(&self) -> Result<StatsSummary> {
        self.summary_at(Utc::now()).await
    }

    pub(crate) async fn summary_at(&self, now: DateTime<Utc>) -> Result<StatsSummary> {
        let snapshot = self
            .snapshots
            .latest()
            .await?
            .ok_or(TelemetryError::NoData)?;

        let (day_total, month_total) = futures::try_join!(
            self.events.count_since(now - Duration::hours(24)),
            self.events.count_since(now - Duration::days(30)),
        )?;

        Ok(build_summary(snapshot, day_total, month_total))
    }

    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let events = self.events.recent(limit).await?;
        Ok(events
            .into_iter()
            .map(|e| ActivityEntry {
                time: e.timestamp.format("%H:%M:%S").to_string(),
                source: e.source_ip,
                destination: e.destination_ip,
                domain: e.domain,
                port: e.port,
                action: e.action,
                threat: e.threat.detected,
                severity: e.threat.severity,
            })
            .collect())
    }
}

fn build_summary(snapshot: Snapshot, day_total: u64, month_total: u64) -> StatsSummary {
    let devices_online = snapshot
        .devices
        .iter()
        .filter(|d| d.status == crate::models::DeviceStatus::Active)
        .count();
    StatsSummary {
        timestamp: snapshot.timestamp.to_rfc3339(),
        total_connections: snapshot.total_connections,
        blocked_connections: snapshot.blocked_connections,
        allowed_connections: snapshot.allowed_connections,
        threats: snapshot.threats,
        active_rules: snapshot.active_rules,
        devices_online,
        security_level: security_level(snapshot.total_connections, snapshot.blocked_connections),
        growth_pct: growth_pct(day_total, month_total),
        hourly_activity: snapshot.hourly_activity,
        firewall_active: snapshot.system.firewall_active,
        uptime_secs: snapshot.system.uptime_secs,
    }
}

/// Share of traffic that got through, as a percentage clamped to [0, 100].
/// No traffic at all reads as fully secure.
fn security_level(total: u64, blocked: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let level = (total.saturating_sub(blocked)) as f64 / total as f64 * 100.0;
    level.clamp(0.0, 100.0)
}

/// Trailing-day event volume against the 30-day daily average.
fn growth_pct(day_total: u64, month_total: u64) -> f64 {
    let daily_avg = month_total as f64 / 30.0;
    if daily_avg == 0.0 {
        return 0.0;
    }
    (day_total as f64 - daily_avg) / daily_avg * 100.0
}
