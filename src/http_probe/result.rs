use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status code stored for probes that never received a response.
pub const NO_RESPONSE_STATUS: u16 = 0;

/// What a single probe attempt observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The target answered; any status counts, including non-2xx.
    Response { status_code: u16, elapsed: Duration },
    /// No response was received. `reason` describes why.
    Failure { reason: String },
}

impl ProbeOutcome {
    pub fn response_time_ms(&self) -> Option<f64> {
        match self {
            ProbeOutcome::Response { elapsed, .. } => Some(elapsed.as_nanos() as f64 / 1_000_000.0),
            ProbeOutcome::Failure { .. } => None,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ProbeOutcome::Response { status_code, .. } => *status_code,
            ProbeOutcome::Failure { .. } => NO_RESPONSE_STATUS,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Response { .. } => None,
            ProbeOutcome::Failure { reason } => Some(reason),
        }
    }
}

/// A completed probe that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewProbeResult {
    /// When the probe was initiated. The store stamps "now" if absent.
    pub timestamp: Option<DateTime<Utc>>,
    pub endpoint: String,
    pub outcome: ProbeOutcome,
}

/// A stored probe row, as served by the `/metrics` endpoint.
///
/// Either `response_time_ms` is set, `status_code` is non-zero and
/// `error_message` is empty, or `response_time_ms` is empty,
/// `status_code` is [`NO_RESPONSE_STATUS`] and `error_message` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    #[serde(rename = "response_time")]
    pub response_time_ms: Option<f64>,
    pub status_code: u16,
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// Flattens an outcome into its row shape once the store has assigned an id.
    pub fn from_new(id: i64, timestamp: DateTime<Utc>, probe: NewProbeResult) -> Self {
        ProbeResult {
            id,
            timestamp,
            response_time_ms: probe.outcome.response_time_ms(),
            status_code: probe.outcome.status_code(),
            error_message: probe.outcome.error_message().map(str::to_string),
            endpoint: probe.endpoint,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status_code == NO_RESPONSE_STATUS
    }
}
