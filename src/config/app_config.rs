use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use url::Url;

use super::error::ConfigError;
use super::model::MonitorConfig;

const USER_AGENT: &str = "uptick-probe/1.0";

/// Validated settings the monitor runs with.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target_url: String,
    pub poll_interval: Duration,
    pub listen_address: SocketAddr,
    pub database_path: PathBuf,
    pub request_timeout: Duration,
    pub accept_invalid_certs: bool,
}

/// Load the application configuration from a YAML file and environment variables
/// This function reads the configuration file specified by the `CONFIG_FILE` environment variable,
/// falls back to defaults when that file does not exist, and lets environment variables
/// (`TARGET_URL`, `POLL_INTERVAL_SECONDS`, `LISTEN_ADDRESS`, `DATABASE_PATH`,
/// `REQUEST_TIMEOUT_SECONDS`, `ACCEPT_INVALID_CERTS`) override individual values.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let config_file_location =
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config.yml".to_string());

    let file_config = read_config_file(Path::new(&config_file_location))?;
    let config = apply_env_overrides(file_config, |key| env::var(key).ok())?;
    let app_config = AppConfig::try_from(config)?;

    tracing::info!(
        "Monitoring {} every {:?}",
        app_config.target_url,
        app_config.poll_interval
    );
    Ok(app_config)
}

/// Reads the YAML config at `path`. A missing file yields the defaults.
pub fn read_config_file(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let config_str = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No config file at {:?}, using defaults", path);
            return Ok(MonitorConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };

    serde_yaml::from_str(&config_str).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

/// Overrides values in `config` with whatever `lookup` returns for the
/// well-known environment keys.
pub fn apply_env_overrides(
    mut config: MonitorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<MonitorConfig, ConfigError> {
    if let Some(url) = lookup("TARGET_URL") {
        config.target_url = Some(url);
    }
    if let Some(value) = lookup("POLL_INTERVAL_SECONDS") {
        config.polling_interval_seconds = parse_seconds("POLL_INTERVAL_SECONDS", &value)?;
    }
    if let Some(value) = lookup("LISTEN_ADDRESS") {
        config.listen_address = value;
    }
    if let Some(value) = lookup("DATABASE_PATH") {
        config.database_path = PathBuf::from(value);
    }
    if let Some(value) = lookup("REQUEST_TIMEOUT_SECONDS") {
        config.request_timeout_seconds = parse_seconds("REQUEST_TIMEOUT_SECONDS", &value)?;
    }
    if let Some(value) = lookup("ACCEPT_INVALID_CERTS") {
        config.accept_invalid_certs = parse_flag("ACCEPT_INVALID_CERTS", &value)?;
    }
    Ok(config)
}

fn parse_seconds(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

impl TryFrom<MonitorConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(config: MonitorConfig) -> Result<Self, Self::Error> {
        let target_url = config
            .target_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingTarget)?;

        let parsed = Url::parse(&target_url).map_err(|e| ConfigError::InvalidTarget {
            url: target_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidTarget {
                url: target_url,
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        if config.polling_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "polling_interval_seconds",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if config.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_seconds",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let listen_address: SocketAddr =
            config
                .listen_address
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                    key: "listen_address",
                    value: config.listen_address.clone(),
                    reason: e.to_string(),
                })?;

        Ok(AppConfig {
            target_url,
            poll_interval: Duration::from_secs(config.polling_interval_seconds),
            listen_address,
            database_path: config.database_path,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            accept_invalid_certs: config.accept_invalid_certs,
        })
    }
}

/// Setup the HTTP client used for probing.
/// The timeout bounds every probe; nothing else cancels one.
pub fn setup_http_client(config: &AppConfig) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .user_agent(USER_AGENT)
        .use_rustls_tls()
        .build()
}
