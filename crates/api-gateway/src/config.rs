//! Gateway configuration.
//!
//! Configuration is loaded once from environment variables at startup.
//! Invalid values fail startup. The identity provider API key is redacted
//! in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default frontend base URL used in password-reset redirects.
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

/// Default rate limit in requests per client per window.
pub const DEFAULT_RATE_LIMIT_RPM: u32 = 60;

/// Default interval between rate-limiter sweeps.
pub const DEFAULT_RATE_LIMIT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Default signing key set cache lifetime (1 hour).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 3600;

/// Default timeout for fetching the signing key set.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Default graceful shutdown drain period.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Path of the key set document relative to the provider base URL.
const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Identity provider base URL, without trailing slash.
    pub auth_provider_url: String,

    /// Signing key set endpoint.
    pub jwks_url: String,

    /// Public API key sent to the identity provider. Redacted in Debug.
    pub auth_provider_api_key: Option<SecretString>,

    /// Frontend base URL for password-reset links.
    pub frontend_url: String,

    /// Relaxes credential verification for local testing. Never enable in
    /// an exposed deployment.
    pub dev_mode: bool,

    /// Requests admitted per client within one window.
    pub rate_limit_rpm: u32,

    /// Seconds between rate-limiter sweeps.
    pub rate_limit_sweep_interval_seconds: u64,

    /// Seconds a fetched key set stays valid.
    pub jwks_cache_ttl_seconds: u64,

    /// Seconds before a key set fetch is abandoned.
    pub jwks_fetch_timeout_seconds: u64,

    /// JWT clock skew tolerance in seconds.
    pub jwt_clock_skew_seconds: i64,

    /// Seconds before an in-flight request is abandoned.
    pub request_timeout_seconds: u64,

    /// Seconds to wait for in-flight requests on shutdown.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("auth_provider_url", &self.auth_provider_url)
            .field("jwks_url", &self.jwks_url)
            .field(
                "auth_provider_api_key",
                &self.auth_provider_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("frontend_url", &self.frontend_url)
            .field("dev_mode", &self.dev_mode)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "rate_limit_sweep_interval_seconds",
                &self.rate_limit_sweep_interval_seconds,
            )
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field("jwks_fetch_timeout_seconds", &self.jwks_fetch_timeout_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid development mode flag: {0}")]
    InvalidDevMode(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let auth_provider_url = vars
            .get("AUTH_PROVIDER_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_PROVIDER_URL".to_string()))?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = vars
            .get("AUTH_JWKS_URL")
            .cloned()
            .unwrap_or_else(|| format!("{auth_provider_url}{JWKS_PATH}"));

        let auth_provider_api_key = vars
            .get("AUTH_PROVIDER_API_KEY")
            .filter(|key| !key.is_empty())
            .map(|key| SecretString::from(key.clone()));

        let frontend_url = vars
            .get("FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());

        let dev_mode = match vars.get("DEV_MODE") {
            Some(value) => parse_flag(value).ok_or_else(|| {
                ConfigError::InvalidDevMode(format!(
                    "DEV_MODE must be one of true, false, 1, 0; got '{value}'"
                ))
            })?,
            None => false,
        };

        // Parse rate limit with validation
        let rate_limit_rpm = if let Some(value_str) = vars.get("RATE_LIMIT_RPM") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRateLimit(format!(
                    "RATE_LIMIT_RPM must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "RATE_LIMIT_RPM must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_RATE_LIMIT_RPM
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            #[allow(clippy::cast_possible_wrap)]
            let max = MAX_CLOCK_SKEW.as_secs() as i64;
            if value > max {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    max, value
                )));
            }

            value
        } else {
            #[allow(clippy::cast_possible_wrap)]
            let default = DEFAULT_CLOCK_SKEW.as_secs() as i64;
            default
        };

        let rate_limit_sweep_interval_seconds = parse_seconds(
            vars,
            "RATE_LIMIT_SWEEP_INTERVAL_SECONDS",
            DEFAULT_RATE_LIMIT_SWEEP_INTERVAL_SECONDS,
        )?;
        let jwks_cache_ttl_seconds =
            parse_seconds(vars, "JWKS_CACHE_TTL_SECONDS", DEFAULT_JWKS_CACHE_TTL_SECONDS)?;
        let jwks_fetch_timeout_seconds = parse_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
        )?;
        let request_timeout_seconds =
            parse_seconds(vars, "REQUEST_TIMEOUT_SECONDS", DEFAULT_REQUEST_TIMEOUT_SECONDS)?;
        // Zero skips the drain.
        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "DRAIN_SECONDS must be a non-negative integer, got '{value_str}': {e}"
                ))
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        Ok(Config {
            bind_address,
            auth_provider_url,
            jwks_url,
            auth_provider_api_key,
            frontend_url,
            dev_mode,
            rate_limit_rpm,
            rate_limit_sweep_interval_seconds,
            jwks_cache_ttl_seconds,
            jwks_fetch_timeout_seconds,
            jwt_clock_skew_seconds,
            request_timeout_seconds,
            drain_seconds,
        })
    }

    /// Clock skew as a `Duration`.
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds.unsigned_abs())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(value)
}
