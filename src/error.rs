use thiserror::Error;

/// Errors surfaced by the telemetry core.
///
/// Background loops (scheduler ticks, retention cadence) log these and keep
/// running; request-path callers (aggregation, stats) propagate them and the
/// HTTP layer renders a generic failure body.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("store error: {0}")]
    Store(#[from] mongodb::error::Error),

    #[error("invalid period: {0:?} (expected 24h, 7d or 30d)")]
    InvalidPeriod(String),

    #[error("invalid port: {0}")]
    InvalidPort(u16),

    #[error("no data available")]
    NoData,

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
