//! Application configuration loaded from environment variables.

use domain::KeyStrategy;
use document_store::DEFAULT_MAX_RETRIES;
use thiserror::Error;

/// Which document store backs the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

/// Shape of log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}: expected {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("DATABASE_URL is required when STORE_BACKEND=postgres")]
    MissingDatabaseUrl,
}

/// Backend configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `STORE_BACKEND`: `memory` or `postgres` (default: `memory`)
/// - `DATABASE_URL`: PostgreSQL connection string (required for `postgres`)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `TRANSACTION_MAX_RETRIES`: conflict retries per transaction (default: `25`)
/// - `ID_STRATEGY`: `push` or `sequential` record keys (default: `push`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub transaction_max_retries: u32,
    pub key_strategy: KeyStrategy,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// unset or empty variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let store = match get("STORE_BACKEND") {
            None => defaults.store,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "postgres" => StoreBackend::Postgres,
                _ => return Err(invalid("STORE_BACKEND", v, "memory or postgres")),
            },
        };

        let key_strategy = match get("ID_STRATEGY") {
            None => defaults.key_strategy,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "push" => KeyStrategy::PushKey,
                "sequential" => KeyStrategy::Sequential,
                _ => return Err(invalid("ID_STRATEGY", v, "push or sequential")),
            },
        };

        let log_format = match get("LOG_FORMAT") {
            None => defaults.log_format,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => return Err(invalid("LOG_FORMAT", v, "pretty or json")),
            },
        };

        let database_max_connections = parse_number(
            "DATABASE_MAX_CONNECTIONS",
            get("DATABASE_MAX_CONNECTIONS"),
            defaults.database_max_connections,
        )?;
        if database_max_connections == 0 {
            return Err(invalid(
                "DATABASE_MAX_CONNECTIONS",
                "0".to_string(),
                "a positive integer",
            ));
        }

        let transaction_max_retries = parse_number(
            "TRANSACTION_MAX_RETRIES",
            get("TRANSACTION_MAX_RETRIES"),
            defaults.transaction_max_retries,
        )?;

        let database_url = get("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            store,
            database_url,
            database_max_connections,
            transaction_max_retries,
            key_strategy,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 5,
            transaction_max_retries: DEFAULT_MAX_RETRIES,
            key_strategy: KeyStrategy::PushKey,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

fn invalid(var: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        expected,
    }
}

fn parse_number(var: &'static str, value: Option<String>, default: u32) -> Result<u32, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| invalid(var, v, "a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.transaction_max_retries, 25);
        assert_eq!(config.key_strategy, KeyStrategy::PushKey);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_postgres_settings() {
        let config = load(&[
            ("STORE_BACKEND", "Postgres"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("TRANSACTION_MAX_RETRIES", "40"),
            ("ID_STRATEGY", "sequential"),
            ("RUST_LOG", "domain=debug"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.transaction_max_retries, 40);
        assert_eq!(config.key_strategy, KeyStrategy::Sequential);
        assert_eq!(config.log_level, "domain=debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_postgres_requires_url() {
        let err = load(&[("STORE_BACKEND", "postgres")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDatabaseUrl));
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = load(&[("STORE_BACKEND", ""), ("TRANSACTION_MAX_RETRIES", " ")]).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.transaction_max_retries, 25);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (var, value) in [
            ("STORE_BACKEND", "redis"),
            ("ID_STRATEGY", "uuid"),
            ("LOG_FORMAT", "xml"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
            ("TRANSACTION_MAX_RETRIES", "-1"),
        ] {
            let err = load(&[(var, value)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var: v, .. } if v == var),
                "{var}={value}"
            );
        }
    }
}
