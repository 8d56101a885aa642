//! Configuration types for seasons and reconciliation runs

use crate::{EvermarkError, EvermarkResult, Timestamp};
use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One week, the season length used in production.
pub const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ============================================================================
// SEASONS
// ============================================================================

/// Season boundaries: seasons are consecutive `period`-long windows starting
/// at `epoch`, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonConfig {
    pub epoch: Timestamp,
    pub period: Duration,
}

impl SeasonConfig {
    pub fn new(epoch: Timestamp, period: Duration) -> EvermarkResult<Self> {
        let config = Self { epoch, period };
        config.validate()?;
        Ok(config)
    }

    /// Weekly seasons starting at `epoch`.
    pub fn weekly(epoch: Timestamp) -> Self {
        Self {
            epoch,
            period: WEEK,
        }
    }

    pub fn validate(&self) -> EvermarkResult<()> {
        if self.period.as_secs() == 0 {
            return Err(EvermarkError::invalid_configuration(
                "season period must be at least one second",
            ));
        }
        if chrono::Duration::from_std(self.period).is_err() {
            return Err(EvermarkError::invalid_configuration(format!(
                "season period {:?} is out of range",
                self.period
            )));
        }
        Ok(())
    }

    /// Period as a chrono duration, for timestamp arithmetic.
    pub fn period_chrono(&self) -> EvermarkResult<chrono::Duration> {
        chrono::Duration::from_std(self.period).map_err(|e| {
            EvermarkError::invalid_configuration(format!("season period out of range: {}", e))
        })
    }
}

impl Default for SeasonConfig {
    /// Weekly seasons from the Unix epoch, useful only in development.
    fn default() -> Self {
        Self::weekly(chrono::Utc.timestamp_opt(0, 0).single().unwrap_or_default())
    }
}

// ============================================================================
// RETRIES
// ============================================================================

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = f64::from(self.backoff_multiplier.max(1.0)).powi(exponent);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// No retries and no waiting. Used by tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// Tuning for one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Votes fetched per ledger page.
    pub page_size: usize,
    /// Retry policy for individual ledger page reads.
    pub retry: RetryConfig,
    /// Deadline for a single attempt; nothing is committed past it.
    pub run_timeout: Duration,
    /// How long a season lease lives before another runner may take it.
    pub lease_ttl: Duration,
    /// Whole-run attempts for retryable failures.
    pub run_attempts: u32,
}

impl ReconcileConfig {
    pub fn validate(&self) -> EvermarkResult<()> {
        if self.page_size == 0 {
            return Err(EvermarkError::invalid_configuration(
                "ledger page size must be greater than 0",
            ));
        }
        if self.run_attempts == 0 {
            return Err(EvermarkError::invalid_configuration(
                "run attempts must be greater than 0",
            ));
        }
        if self.run_timeout.is_zero() {
            return Err(EvermarkError::invalid_configuration(
                "run timeout must be positive",
            ));
        }
        if self.lease_ttl < self.run_timeout {
            return Err(EvermarkError::invalid_configuration(format!(
                "lease ttl {:?} must cover the run timeout {:?}",
                self.lease_ttl, self.run_timeout
            )));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            retry: RetryConfig::default(),
            run_timeout: Duration::from_secs(120),
            lease_ttl: Duration::from_secs(300),
            run_attempts: 3,
        }
    }
}
