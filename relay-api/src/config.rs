//! API Configuration
//!
//! Server, logging, CORS and core settings, read from `RELAY_*` environment
//! variables with defaults suitable for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use relay_core::{RelayConfig, SelectionStrategy};

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;
pub const DEFAULT_HANDOFF_SWEEP_INTERVAL_SECS: u64 = 60;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(ApiError::invalid_input(format!(
                "Invalid log format '{}', expected json or pretty",
                s
            ))),
        }
    }
}

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,

    /// How often pending handoffs are checked for expiry
    pub handoff_sweep_interval: Duration,

    /// Settings passed through to the assignment core
    pub relay: RelayConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_format: LogFormat::default(),
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            handoff_sweep_interval: Duration::from_secs(DEFAULT_HANDOFF_SWEEP_INTERVAL_SECS),
            relay: RelayConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `RELAY_HOST`: Bind host (default: 0.0.0.0)
    /// - `RELAY_PORT` or `PORT`: Bind port (default: 3000)
    /// - `RELAY_LOG_FORMAT`: "json" or "pretty" (default: json)
    /// - `RELAY_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `RELAY_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `RELAY_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `RELAY_HANDOFF_SWEEP_INTERVAL_SECS`: Expiry check interval (default: 60)
    /// - `RELAY_HANDOFF_TTL_SECS`: Pending handoff lifetime (default: 1800)
    /// - `RELAY_RECENT_WINDOW_SECS`: Recent completion window (default: 7 days)
    /// - `RELAY_SELECTION_STRATEGY`: "least_loaded" or "lowest_id"
    /// - `RELAY_DEFAULT_PAGE_SIZE` / `RELAY_MAX_PAGE_SIZE`: Listing limits (50 / 500)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("RELAY_PORT").or_else(|| lookup("PORT")) {
            Some(value) => parse_value("RELAY_PORT", &value)?,
            None => defaults.port,
        };

        let log_format = match lookup("RELAY_LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => defaults.log_format,
        };

        let cors_origins = lookup("RELAY_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = lookup("RELAY_CORS_ALLOW_CREDENTIALS")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.cors_allow_credentials);

        let mut relay = defaults.relay.clone();
        if let Some(value) = lookup("RELAY_HANDOFF_TTL_SECS") {
            relay.handoff_ttl = Duration::from_secs(parse_value("RELAY_HANDOFF_TTL_SECS", &value)?);
        }
        if let Some(value) = lookup("RELAY_RECENT_WINDOW_SECS") {
            relay.recent_completion_window =
                Duration::from_secs(parse_value("RELAY_RECENT_WINDOW_SECS", &value)?);
        }
        if let Some(value) = lookup("RELAY_SELECTION_STRATEGY") {
            relay.selection_strategy = value
                .parse::<SelectionStrategy>()
                .map_err(|e| ApiError::invalid_input(e.to_string()))?;
        }
        if let Some(value) = lookup("RELAY_DEFAULT_PAGE_SIZE") {
            relay.default_page_size = parse_value("RELAY_DEFAULT_PAGE_SIZE", &value)?;
        }
        if let Some(value) = lookup("RELAY_MAX_PAGE_SIZE") {
            relay.max_page_size = parse_value("RELAY_MAX_PAGE_SIZE", &value)?;
        }
        relay
            .validate()
            .map_err(|e| ApiError::invalid_input(e.to_string()))?;

        let config = Self {
            host: lookup("RELAY_HOST").unwrap_or(defaults.host),
            port,
            log_format,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: lookup("RELAY_CORS_MAX_AGE_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
            handoff_sweep_interval: Duration::from_secs(
                lookup("RELAY_HANDOFF_SWEEP_INTERVAL_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_HANDOFF_SWEEP_INTERVAL_SECS),
            ),
            relay,
        };

        if config.handoff_sweep_interval.is_zero() {
            return Err(ApiError::invalid_input(
                "RELAY_HANDOFF_SWEEP_INTERVAL_SECS must be positive",
            ));
        }
        Ok(config)
    }

    /// Socket address to bind the server to.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> ApiResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid_input(format!("Invalid value for {}: {}", key, value)))
}
