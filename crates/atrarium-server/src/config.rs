//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retention sweep settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Network configuration for the HTTP read surface.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "atrarium_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Post retention sweep configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Post retention window in days, measured from each post's own
    /// creation time.
    #[serde(default = "default_retention_days")]
    pub days: i64,

    /// Seconds between background sweeps.
    #[serde(default = "default_retention_interval")]
    pub interval_seconds: u64,
}

/// Ingestion configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    /// Optional JSONL relay-event dump to ingest on startup.
    #[serde(default)]
    pub events_path: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "atrarium.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retention_days() -> i64 {
    atrarium_types::DEFAULT_RETENTION_DAYS
}

fn default_retention_interval() -> u64 {
    3_600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            interval_seconds: default_retention_interval(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist.
///
/// Environment variable overrides:
/// - `ATRARIUM_HOST` overrides `server.host`
/// - `ATRARIUM_PORT` overrides `server.port`
/// - `ATRARIUM_DB_PATH` overrides `database.path`
/// - `ATRARIUM_LOG_LEVEL` overrides `logging.level`
/// - `ATRARIUM_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `ATRARIUM_RETENTION_DAYS` overrides `retention.days`
/// - `ATRARIUM_EVENTS_PATH` overrides `ingest.events_path`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) if std::path::Path::new(p).exists() => {
            let text = std::fs::read_to_string(p)?;
            toml::from_str(&text)?
        }
        _ => Config::default(),
    };

    if let Ok(host) = std::env::var("ATRARIUM_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("ATRARIUM_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("ATRARIUM_DB_PATH") {
        if !db_path.trim().is_empty() {
            config.database.path = db_path;
        }
    }
    if let Ok(level) = std::env::var("ATRARIUM_LOG_LEVEL") {
        if !level.trim().is_empty() {
            config.logging.level = level;
        }
    }
    if let Ok(json) = std::env::var("ATRARIUM_LOG_JSON") {
        config.logging.json = json == "true";
    }
    if let Ok(days) = std::env::var("ATRARIUM_RETENTION_DAYS") {
        if let Ok(parsed) = days.parse() {
            config.retention.days = parsed;
        }
    }
    if let Ok(events) = std::env::var("ATRARIUM_EVENTS_PATH") {
        if !events.trim().is_empty() {
            config.ingest.events_path = Some(events);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_no_file() {
        let config = load_config(None).expect("defaults should load");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, "atrarium.db");
        assert_eq!(config.retention.days, 7);
        assert!(config.ingest.events_path.is_none());
    }

    #[test]
    fn parses_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).expect("create");
        writeln!(
            f,
            "[server]\nport = 8080\n\n[retention]\ndays = 14\n"
        )
        .expect("write");

        let config = load_config(path.to_str()).expect("should parse");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retention.days, 14);
        // Untouched sections keep defaults.
        assert_eq!(config.database.pool_max_size, 8);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/config.toml")).expect("fallback");
        assert_eq!(config.server.port, 3000);
    }
}
