//! API Configuration Module
//!
//! Configuration for the HTTP surface, seasons and reconciliation runs.
//! Everything is loaded from environment variables with development
//! defaults; production deployments must set the season epoch, CORS origins
//! and admin keys explicitly.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use evermark_core::{EvermarkError, EvermarkResult, ReconcileConfig, RetryConfig, SeasonConfig};

use crate::constants::{
    DEFAULT_BIND_ADDR, DEFAULT_CACHE_MAX_STALENESS_SECS, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_PORT,
};
use crate::error::{ApiError, ApiResult};

/// Parse `key` from `lookup`, falling back to `default` when unset or invalid.
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn flag_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn list(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Vec<String> {
    lookup(key)
        .map(|s| {
            s.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub port: u16,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,

    /// Deployment environment name ("development", "production", ...).
    pub environment: String,

    /// Keys accepted in the `x-api-key` header for the refresh trigger.
    /// Empty leaves the trigger open, which is refused in production.
    pub admin_api_keys: Vec<String>,

    /// Staleness bound for cached leaderboard pages.
    pub cache_max_staleness: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            environment: "development".to_string(),
            admin_api_keys: Vec::new(),
            cache_max_staleness: Duration::from_secs(DEFAULT_CACHE_MAX_STALENESS_SECS),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `EVERMARK_API_BIND`: Bind address (default: 0.0.0.0)
    /// - `PORT` / `EVERMARK_API_PORT`: Listening port (default: 3000)
    /// - `EVERMARK_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `EVERMARK_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `EVERMARK_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `EVERMARK_ENVIRONMENT`: Deployment environment (default: development)
    /// - `EVERMARK_ADMIN_API_KEYS`: Comma-separated admin keys
    /// - `EVERMARK_CACHE_MAX_STALENESS_SECS`: Read cache staleness (default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let port = lookup("PORT")
            .or_else(|| lookup("EVERMARK_API_PORT"))
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(defaults.port);

        Self {
            bind_addr: lookup("EVERMARK_API_BIND")
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .unwrap_or(defaults.bind_addr),
            port,
            cors_origins: list(&lookup, "EVERMARK_CORS_ORIGINS"),
            cors_allow_credentials: flag_or(&lookup, "EVERMARK_CORS_ALLOW_CREDENTIALS", false),
            cors_max_age_secs: parse_or(&lookup, "EVERMARK_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs),
            environment: lookup("EVERMARK_ENVIRONMENT")
                .map(|e| e.trim().to_lowercase())
                .unwrap_or(defaults.environment),
            admin_api_keys: list(&lookup, "EVERMARK_ADMIN_API_KEYS"),
            cache_max_staleness: Duration::from_secs(parse_or(
                &lookup,
                "EVERMARK_CACHE_MAX_STALENESS_SECS",
                DEFAULT_CACHE_MAX_STALENESS_SECS,
            )),
        }
    }

    /// Check if running in a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "production" | "prod")
    }

    /// `host:port` to bind the listener to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.evermarks.net
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }

    /// Refuse to start a production server with open CORS or an open
    /// refresh trigger.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        if !self.is_production() {
            return Ok(());
        }
        if self.cors_origins.is_empty() {
            return Err(ApiError::configuration_error(
                "CORS origins not configured for production. Set EVERMARK_CORS_ORIGINS.",
            ));
        }
        if self.admin_api_keys.is_empty() {
            return Err(ApiError::configuration_error(
                "Admin API keys not configured for production. Set EVERMARK_ADMIN_API_KEYS.",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SEASON CONFIGURATION
// ============================================================================

/// Load the season configuration.
///
/// - `EVERMARK_SEASON_EPOCH`: RFC 3339 start of season 1 (required in production)
/// - `EVERMARK_SEASON_PERIOD_SECS`: Season length (default: 604800)
pub fn season_config_from_env(production: bool) -> EvermarkResult<SeasonConfig> {
    season_config_from_lookup(env_lookup, production)
}

pub fn season_config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
    production: bool,
) -> EvermarkResult<SeasonConfig> {
    let defaults = SeasonConfig::default();

    let epoch = match lookup("EVERMARK_SEASON_EPOCH") {
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                EvermarkError::invalid_configuration(format!(
                    "EVERMARK_SEASON_EPOCH is not RFC 3339: {}",
                    e
                ))
            })?,
        None if production => {
            return Err(EvermarkError::invalid_configuration(
                "EVERMARK_SEASON_EPOCH must be set in production",
            ))
        }
        None => defaults.epoch,
    };

    let period = match lookup("EVERMARK_SEASON_PERIOD_SECS") {
        Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
            EvermarkError::invalid_configuration(format!(
                "EVERMARK_SEASON_PERIOD_SECS is not a number of seconds: {}",
                raw
            ))
        })?),
        None => defaults.period,
    };

    SeasonConfig::new(epoch, period)
}

// ============================================================================
// RECONCILIATION CONFIGURATION
// ============================================================================

/// Load the reconciliation configuration.
///
/// - `EVERMARK_LEDGER_PAGE_SIZE` (100)
/// - `EVERMARK_MAX_RETRIES` (3)
/// - `EVERMARK_INITIAL_BACKOFF_MS` (200)
/// - `EVERMARK_MAX_BACKOFF_MS` (5000)
/// - `EVERMARK_RUN_TIMEOUT_SECS` (120)
/// - `EVERMARK_LEASE_TTL_SECS` (300)
/// - `EVERMARK_RUN_ATTEMPTS` (3)
pub fn reconcile_config_from_env() -> EvermarkResult<ReconcileConfig> {
    reconcile_config_from_lookup(env_lookup)
}

pub fn reconcile_config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> EvermarkResult<ReconcileConfig> {
    let defaults = ReconcileConfig::default();
    let retry_defaults = RetryConfig::default();

    let config = ReconcileConfig {
        page_size: parse_or(&lookup, "EVERMARK_LEDGER_PAGE_SIZE", defaults.page_size),
        retry: RetryConfig {
            max_retries: parse_or(&lookup, "EVERMARK_MAX_RETRIES", retry_defaults.max_retries),
            initial_backoff: Duration::from_millis(parse_or(
                &lookup,
                "EVERMARK_INITIAL_BACKOFF_MS",
                retry_defaults.initial_backoff.as_millis() as u64,
            )),
            max_backoff: Duration::from_millis(parse_or(
                &lookup,
                "EVERMARK_MAX_BACKOFF_MS",
                retry_defaults.max_backoff.as_millis() as u64,
            )),
            backoff_multiplier: retry_defaults.backoff_multiplier,
        },
        run_timeout: Duration::from_secs(parse_or(
            &lookup,
            "EVERMARK_RUN_TIMEOUT_SECS",
            defaults.run_timeout.as_secs(),
        )),
        lease_ttl: Duration::from_secs(parse_or(
            &lookup,
            "EVERMARK_LEASE_TTL_SECS",
            defaults.lease_ttl.as_secs(),
        )),
        run_attempts: parse_or(&lookup, "EVERMARK_RUN_ATTEMPTS", defaults.run_attempts),
    };

    config.validate()?;
    Ok(config)
}
