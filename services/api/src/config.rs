//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use genapi_core::PathPolicy;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Limits applied to every evaluation of generated code.
#[derive(Clone, Debug)]
pub struct ExecutionLimits {
    /// Wall-clock budget; the isolate is terminated when it runs out.
    pub timeout: Duration,
    /// V8 heap ceiling for one evaluation.
    pub heap_limit_bytes: usize,
    /// Expand literal `\n`/`\t`/`\r` sequences in stored code before running it.
    pub unescape_source: bool,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            heap_limit_bytes: 64 * 1024 * 1024,
            unescape_source: true,
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Absent means endpoints live in memory for the lifetime of the process.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub generation_webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub execution: ExecutionLimits,
    pub path_policy: PathPolicy,
    pub max_body_bytes: usize,
    pub cors_allowed_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            database_max_connections: 5,
            log_level: Level::INFO,
            generation_webhook_url: None,
            webhook_timeout: Duration::from_secs(120),
            execution: ExecutionLimits::default(),
            path_policy: PathPolicy::Full,
            max_body_bytes: 10 * 1024 * 1024,
            cors_allowed_origin: "http://localhost:3000".to_string(),
        }
    }
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
        let defaults = Self::default();

        // --- Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", defaults.bind_address)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let database_max_connections =
            parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generation Webhook ---
        let generation_webhook_url =
            lookup("GENERATION_WEBHOOK_URL").filter(|url| !url.trim().is_empty());
        let webhook_timeout = Duration::from_secs(parse_or(
            &lookup,
            "WEBHOOK_TIMEOUT_SECS",
            defaults.webhook_timeout.as_secs(),
        )?);

        // --- Endpoint Execution ---
        let timeout_ms: u64 = parse_or(
            &lookup,
            "EXECUTION_TIMEOUT_MS",
            defaults.execution.timeout.as_millis() as u64,
        )?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "EXECUTION_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let heap_limit_mb: usize = parse_or(
            &lookup,
            "EXECUTION_HEAP_LIMIT_MB",
            defaults.execution.heap_limit_bytes / (1024 * 1024),
        )?;
        if heap_limit_mb < 8 {
            return Err(ConfigError::InvalidValue(
                "EXECUTION_HEAP_LIMIT_MB".to_string(),
                "must be at least 8".to_string(),
            ));
        }
        let execution = ExecutionLimits {
            timeout: Duration::from_millis(timeout_ms),
            heap_limit_bytes: heap_limit_mb * 1024 * 1024,
            unescape_source: parse_or(&lookup, "UNESCAPE_SOURCE", defaults.execution.unescape_source)?,
        };

        let path_policy = match lookup("REQUEST_PATH_POLICY") {
            Some(raw) => raw
                .parse::<PathPolicy>()
                .map_err(|e| ConfigError::InvalidValue("REQUEST_PATH_POLICY".to_string(), e))?,
            None => defaults.path_policy,
        };

        let max_body_bytes = parse_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?;
        let cors_allowed_origin =
            lookup("CORS_ALLOWED_ORIGIN").unwrap_or(defaults.cors_allowed_origin);

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            generation_webhook_url,
            webhook_timeout,
            execution,
            path_policy,
            max_body_bytes,
            cors_allowed_origin,
        })
    }
}

fn parse_or<T, F>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
