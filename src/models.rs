use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TelemetryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allowed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
}

/// Threat annotation carried by a network event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatInfo {
    pub detected: bool,
    pub threat_type: Option<String>,
    pub severity: Option<Severity>,
}

impl ThreatInfo {
    pub fn none() -> Self {
        Self {
            detected: false,
            threat_type: None,
            severity: None,
        }
    }
}

/// One recorded network occurrence. Immutable once written; only the
/// retention manager deletes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvent {
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub destination_ip: String,
    pub domain: Option<String>,
    pub port: u16,
    pub protocol: Protocol,
    pub action: Action,
    pub rule_id: String,
    pub bytes: u64,
    pub threat: ThreatInfo,
}

impl NetworkEvent {
    /// Ports are 1-65535; 0 is rejected.
    pub fn new(
        source_ip: impl Into<String>,
        destination_ip: impl Into<String>,
        port: u16,
        protocol: Protocol,
        action: Action,
        rule_id: impl Into<String>,
        bytes: u64,
    ) -> Result<Self> {
        if port == 0 {
            return Err(TelemetryError::InvalidPort(port));
        }
        Ok(Self {
            timestamp: Utc::now(),
            source_ip: source_ip.into(),
            destination_ip: destination_ip.into(),
            domain: None,
            port,
            protocol,
            action,
            rule_id: rule_id.into(),
            bytes,
            threat: ThreatInfo::none(),
        })
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_threat(mut self, threat_type: impl Into<String>, severity: Severity) -> Self {
        self.threat = ThreatInfo {
            detected: true,
            threat_type: Some(threat_type.into()),
            severity: Some(severity),
        };
        self
    }
}

/// A device currently known to the appliance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedDevice {
    pub ip: String,
    pub mac: String,
    pub hostname: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub last_seen: DateTime<Utc>,
    pub status: DeviceStatus,
}

/// One hour-slot of the trailing-24h activity summary embedded in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyActivity {
    pub hour: String,
    pub total: u64,
    pub blocked: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub firewall_active: bool,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub last_update: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Point-in-time rollup of system/network counters. Append-only: written by
/// the collector and the bootstrap seeder, deleted only by retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub total_connections: u64,
    pub blocked_connections: u64,
    pub allowed_connections: u64,
    pub threats: u64,
    pub active_rules: u64,
    pub devices: Vec<ConnectedDevice>,
    pub hourly_activity: Vec<HourlyActivity>,
    pub system: SystemStatus,
}

impl Snapshot {
    /// Builds a snapshot, enforcing `allowed = total - blocked >= 0`.
    ///
    /// A blocked count exceeding the total is a data-integrity problem in the
    /// underlying counters; it is clamped (blocked := total, allowed := 0)
    /// and logged rather than propagated as an error.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        total_connections: u64,
        blocked_connections: u64,
        threats: u64,
        active_rules: u64,
        devices: Vec<ConnectedDevice>,
        hourly_activity: Vec<HourlyActivity>,
        system: SystemStatus,
    ) -> Self {
        let blocked = if blocked_connections > total_connections {
            warn!(
                total = total_connections,
                blocked = blocked_connections,
                "blocked count exceeds total; clamping"
            );
            total_connections
        } else {
            blocked_connections
        };
        Self {
            timestamp,
            total_connections,
            blocked_connections: blocked,
            allowed_connections: total_connections - blocked,
            threats,
            active_rules,
            devices,
            hourly_activity,
            system,
        }
    }
}

/// One time-slot of an aggregation response. Ephemeral: produced fresh per
/// request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub total: u64,
    pub blocked: u64,
    pub allowed: u64,
    pub threats: u64,
}

impl Bucket {
    pub fn zero(label: String) -> Self {
        Self {
            label,
            total: 0,
            blocked: 0,
            allowed: 0,
            threats: 0,
        }
    }
}

/// Firewall rule as far as the telemetry core needs it: the rule store itself
/// (CRUD, matching) is an external collaborator; the core only counts active
/// rules and seeds the default catalog on first run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallRule {
    pub name: String,
    pub action: Action,
    pub protocol: Option<Protocol>,
    pub port: Option<u16>,
    pub enabled: bool,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl FirewallRule {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            protocol: None,
            port: None,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}
