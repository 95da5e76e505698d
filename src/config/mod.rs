use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod request_id;

pub use cors::create_cors_layer;
pub use request_id::create_request_id_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NOTIFY_QUEUE_DEPTH: usize = 256;
const DEFAULT_NOTIFY_MAX_IN_FLIGHT: usize = 16;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` selects the in-process store.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound on waiting for an event's atomic unit.
    pub lock_timeout: Duration,
    pub notify_webhook_url: Option<String>,
    pub notify_timeout: Duration,
    pub notify_queue_depth: usize,
    /// Deliveries allowed to run at once.
    pub notify_max_in_flight: usize,
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Ok(Self {
            database_url: text("DATABASE_URL"),
            bind_addr: parse(&text, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?,
            max_connections: parse(&text, "DB_MAX_CONNECTIONS", Some(DEFAULT_MAX_CONNECTIONS))?,
            acquire_timeout: millis(&text, "DB_ACQUIRE_TIMEOUT_MS", DEFAULT_ACQUIRE_TIMEOUT_MS)?,
            lock_timeout: millis(&text, "REGISTRATION_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)?,
            notify_webhook_url: text("NOTIFY_WEBHOOK_URL"),
            notify_timeout: millis(&text, "NOTIFY_TIMEOUT_MS", DEFAULT_NOTIFY_TIMEOUT_MS)?,
            notify_queue_depth: parse(
                &text,
                "NOTIFY_QUEUE_DEPTH",
                Some(DEFAULT_NOTIFY_QUEUE_DEPTH),
            )?,
            notify_max_in_flight: positive(
                &text,
                "NOTIFY_MAX_IN_FLIGHT",
                DEFAULT_NOTIFY_MAX_IN_FLIGHT,
            )?,
            cors_allowed_origins: text("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
        })
    }
}

fn parse<T, F>(text: &F, name: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match text(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => default.ok_or(ConfigError::Invalid {
            name,
            value: String::new(),
        }),
    }
}

fn millis<F>(text: &F, name: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse(text, name, Some(default))?;
    if ms == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

fn positive<F>(text: &F, name: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse(text, name, Some(default))? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        }),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_select_in_process_store() {
        let config = config_from(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.bind_addr, "0.0.0.0:3001".parse().unwrap());
        assert_eq!(config.lock_timeout, Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS));
        assert_eq!(config.notify_queue_depth, DEFAULT_NOTIFY_QUEUE_DEPTH);
        assert_eq!(config.notify_max_in_flight, DEFAULT_NOTIFY_MAX_IN_FLIGHT);
        assert_eq!(config.cors_allowed_origins, DEFAULT_ALLOWED_ORIGINS);
    }

    #[test]
    fn test_values_are_read_and_trimmed() {
        let config = config_from(&[
            ("DATABASE_URL", " postgres://localhost/huddle "),
            ("REGISTRATION_LOCK_TIMEOUT_MS", "750"),
            ("NOTIFY_WEBHOOK_URL", ""),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/huddle"));
        assert_eq!(config.lock_timeout, Duration::from_millis(750));
        assert!(config.notify_webhook_url.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("DB_MAX_CONNECTIONS", "many")]),
            Err(ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", .. })
        ));
        assert!(config_from(&[("REGISTRATION_LOCK_TIMEOUT_MS", "0")]).is_err());
        assert!(config_from(&[("BIND_ADDR", "not-an-address")]).is_err());
        assert!(config_from(&[("NOTIFY_MAX_IN_FLIGHT", "0")]).is_err());
    }
}
