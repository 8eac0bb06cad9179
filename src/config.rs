use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::shared::utils::{get_hostname, parse_duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Redis,
    Memory,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sql" | "jdbc" => Ok(Backend::Sqlite),
            "redis" => Ok(Backend::Redis),
            "memory" | "in-memory" => Ok(Backend::Memory),
            other => Err(ConfigError::InvalidBackend(other.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::Redis => write!(f, "redis"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub backend: Backend,
    pub database_url: String,
    pub table_name: String,
    pub use_db_time: bool,
    pub locked_by: String,
    pub redis_url: String,
    pub redis_env: String,
    pub key_prefix: String,
    pub task_name: String,
    pub lock_at_most_for: Duration,
    pub lock_at_least_for: Duration,
    pub run_interval: Duration,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (environment, map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let backend = var("OXILOCK_BACKEND", "sqlite").parse()?;

        let database_url = var("DATABASE_URL", "sqlite://oxilock.db?mode=rwc");
        let table_name = var("OXILOCK_TABLE_NAME", "shedlock");

        let use_db_time = parse_bool("OXILOCK_USE_DB_TIME", &var("OXILOCK_USE_DB_TIME", "false"))?;

        let locked_by = lookup("OXILOCK_LOCKED_BY")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(get_hostname);

        let redis_url = var("REDIS_URL", "redis://127.0.0.1:6379");
        let redis_env = var("OXILOCK_ENV", "default");
        let key_prefix = var("OXILOCK_KEY_PREFIX", "job-lock");

        let task_name = var("OXILOCK_TASK_NAME", "heartbeat");
        let lock_at_most_for = duration("OXILOCK_LOCK_AT_MOST_FOR", &var("OXILOCK_LOCK_AT_MOST_FOR", "10m"))?;
        let lock_at_least_for =
            duration("OXILOCK_LOCK_AT_LEAST_FOR", &var("OXILOCK_LOCK_AT_LEAST_FOR", "0s"))?;
        let run_interval = duration("OXILOCK_RUN_INTERVAL", &var("OXILOCK_RUN_INTERVAL", "1m"))?;

        if lock_at_least_for > lock_at_most_for {
            return Err(ConfigError::InvalidValue {
                key: "OXILOCK_LOCK_AT_LEAST_FOR".to_string(),
                reason: "must not be longer than OXILOCK_LOCK_AT_MOST_FOR".to_string(),
            });
        }
        if run_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "OXILOCK_RUN_INTERVAL".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        let otel_exporter_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT");

        let service_name = var("SERVICE_NAME", "oxilock");

        let metrics_port: u16 = var("METRICS_PORT", "9000")
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;
        // 0 disables the exporter
        let metrics_port = (metrics_port != 0).then_some(metrics_port);

        Ok(Config {
            backend,
            database_url,
            table_name,
            use_db_time,
            locked_by,
            redis_url,
            redis_env,
            key_prefix,
            task_name,
            lock_at_most_for,
            lock_at_least_for,
            run_interval,
            otel_exporter_endpoint,
            service_name,
            metrics_port,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}' is not a boolean", value),
        }),
    }
}

fn duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|reason| ConfigError::InvalidValue {
        key: key.to_string(),
        reason,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown lock backend '{0}', expected sqlite, redis or memory")]
    InvalidBackend(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid port number")]
    InvalidPort,
}
