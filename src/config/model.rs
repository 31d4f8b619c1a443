use std::path::PathBuf;

use serde::Deserialize;

/// The monitor configuration as written in the YAML file.
/// Every field may be omitted and supplied through the environment instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// The URL of the endpoint to probe.
    pub target_url: Option<String>,

    /// Seconds between the end of one scheduled probe and the start of the next.
    pub polling_interval_seconds: u64,

    /// Address the JSON API binds to.
    pub listen_address: String,

    /// Location of the SQLite history file.
    pub database_path: PathBuf,

    /// Per-request timeout for the outbound probe.
    pub request_timeout_seconds: u64,

    /// Probe endpoints with self-signed or expired certificates.
    pub accept_invalid_certs: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            target_url: None,
            polling_interval_seconds: 30,
            listen_address: "0.0.0.0:5000".to_string(),
            database_path: PathBuf::from("metrics.db"),
            request_timeout_seconds: 10,
            accept_invalid_certs: false,
        }
    }
}
