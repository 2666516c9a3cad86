//! Service configuration.
//!
//! All values come from environment variables; a `.env` file is loaded by the
//! binary before `AppConfig::load_with_service` runs.

use std::str::FromStr;
use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Application configuration shared by every service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name used in logs and response metadata.
    pub service_name: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// URL of the MySQL metadata database (registered databases, audit trail).
    pub database_url: String,
    /// Timeout for opening a connection to a registered database.
    pub connect_timeout_secs: u64,
    /// Upper bound of open connections per registered database.
    pub max_connections: u32,
    /// Idle connections above the pool floor are closed after this many seconds.
    pub idle_timeout_secs: u64,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "query-service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8082,
            database_url: String::new(),
            connect_timeout_secs: 10,
            max_connections: 10,
            idle_timeout_secs: 300,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from the environment for the given service.
    pub fn load_with_service(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            host: lookup("SERVER_HOST").unwrap_or(defaults.host),
            port: parse_or("SERVER_PORT", &lookup, defaults.port),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            connect_timeout_secs: parse_or(
                "DB_CONNECT_TIMEOUT_SECS",
                &lookup,
                defaults.connect_timeout_secs,
            ),
            max_connections: parse_or("DB_MAX_CONNECTIONS", &lookup, defaults.max_connections),
            idle_timeout_secs: parse_or("DB_IDLE_TIMEOUT_SECS", &lookup, defaults.idle_timeout_secs),
            log_format: parse_or("LOG_FORMAT", &lookup, defaults.log_format),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "invalid config value, using default");
                default
            }
        },
        None => default,
    }
}
