//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use reflects_core::rate_limit::RateLimitMode;
use sqlx::postgres::PgConnectOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// How to reach Postgres: a full URL, or the individual connection parameters.
#[derive(Clone, Debug)]
pub enum DatabaseConfig {
    Url(String),
    Params {
        host: String,
        name: String,
        user: String,
        password: String,
        port: u16,
    },
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match self {
            DatabaseConfig::Url(url) => PgConnectOptions::from_str(url)
                .map_err(|e| ConfigError::InvalidValue("DATABASE_URL".to_string(), e.to_string())),
            DatabaseConfig::Params {
                host,
                name,
                user,
                password,
                port,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .database(name)
                .username(user)
                .password(password)
                .port(*port)),
        }
    }
}

/// Where rate limit counters are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CounterBackend {
    Redis { url: String },
    /// Single-process only; counters are lost on restart.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database: DatabaseConfig,
    pub log_level: Level,
    pub rate_limit_mode: RateLimitMode,
    pub counter_backend: CounterBackend,
    pub reflection_daily_limit: u32,
    pub feedback_daily_limit: u32,
    pub upload_dir: PathBuf,
    pub upload_base_url: String,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));

        // --- Load Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Database Settings ---
        let database = match lookup("DATABASE_URL") {
            Some(url) => DatabaseConfig::Url(url),
            None => {
                let port_str = required("DB_PORT")?;
                let port = port_str.parse::<u16>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "DB_PORT".to_string(),
                        format!("'{}' is not a valid port", port_str),
                    )
                })?;
                DatabaseConfig::Params {
                    host: required("DB_HOST")?,
                    name: required("DB_NAME")?,
                    user: required("DB_USER")?,
                    password: required("DB_PASS")?,
                    port,
                }
            }
        };

        // --- Load Rate Limit Settings ---
        let mode_str = lookup("RATE_LIMIT_MODE").unwrap_or_else(|| "fixed".to_string());
        let rate_limit_mode = mode_str
            .parse::<RateLimitMode>()
            .map_err(|e| ConfigError::InvalidValue("RATE_LIMIT_MODE".to_string(), e.to_string()))?;

        let store_str = lookup("RATE_LIMIT_STORE").unwrap_or_else(|| "redis".to_string());
        let counter_backend = match store_str.trim() {
            "redis" => CounterBackend::Redis {
                url: required("REDIS_URL")?,
            },
            "memory" => CounterBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RATE_LIMIT_STORE".to_string(),
                    format!("'{}' is not one of 'redis', 'memory'", other),
                ))
            }
        };

        let reflection_daily_limit = parse_limit(&lookup, "REFLECTION_DAILY_LIMIT", 30)?;
        let feedback_daily_limit = parse_limit(&lookup, "FEEDBACK_DAILY_LIMIT", 20)?;

        // --- Load Upload and Web Settings ---
        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));
        let upload_base_url = lookup("UPLOAD_BASE_URL").unwrap_or_else(|| "/uploads".to_string());
        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());
        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            None => 100 * 1024 * 1024,
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue(
                    "MAX_UPLOAD_BYTES".to_string(),
                    format!("'{}' is not a byte count", raw),
                )
            })?,
        };

        Ok(Self {
            bind_address,
            database,
            log_level,
            rate_limit_mode,
            counter_backend,
            reflection_daily_limit,
            feedback_daily_limit,
            upload_dir,
            upload_base_url,
            cors_origin,
            max_upload_bytes,
        })
    }
}

/// Parses a positive quota, falling back to `default` when unset.
fn parse_limit<F>(lookup: &F, name: &str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}
