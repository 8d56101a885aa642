//! Season oracle: maps wall-clock time to season numbers.
//!
//! Seasons are derived deterministically from [`SeasonConfig`]:
//!
//! ```text
//! number = floor((date - epoch) / period) + 1
//! start  = epoch + (number - 1) * period
//! end    = start + period
//! ```
//!
//! A date before the epoch is a configuration error, never season 0 or a
//! negative season. The date-derived number is authoritative; a number
//! reported by the on-chain season contract is only compared against it
//! (see [`SeasonOracle::cross_check`]).

use crate::{EvermarkError, EvermarkResult, SeasonConfig, SeasonNumber, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// A fixed-length voting window. `start` is inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Season {
    pub number: SeasonNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub start: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub end: Timestamp,
}

impl Season {
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at < self.end
    }

    pub fn is_over(&self, now: Timestamp) -> bool {
        now >= self.end
    }
}

/// Result of comparing the derived season with the contract's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SeasonCrossCheck {
    pub derived: SeasonNumber,
    pub reported: SeasonNumber,
    pub agrees: bool,
}

/// Computes seasons and caches the current one.
///
/// The cache is an explicit object owned by whoever constructs the oracle;
/// share it behind an `Arc` and call [`invalidate`](Self::invalidate) when a
/// transition is handled.
#[derive(Debug)]
pub struct SeasonOracle {
    config: SeasonConfig,
    current: RwLock<Option<Season>>,
}

impl SeasonOracle {
    pub fn new(config: SeasonConfig) -> EvermarkResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            current: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &SeasonConfig {
        &self.config
    }

    /// Season containing `date`.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `date` precedes the configured epoch.
    pub fn season_for_date(&self, date: Timestamp) -> EvermarkResult<Season> {
        if date < self.config.epoch {
            return Err(EvermarkError::invalid_configuration(format!(
                "season epoch {} is after {}",
                self.config.epoch.to_rfc3339(),
                date.to_rfc3339()
            )));
        }

        let period_ms = self.config.period_chrono()?.num_milliseconds();
        let elapsed_ms = (date - self.config.epoch).num_milliseconds();
        let index = elapsed_ms / period_ms;
        let number = SeasonNumber::try_from(index + 1).map_err(|_| {
            EvermarkError::invalid_configuration(format!(
                "season index {} is out of range",
                index
            ))
        })?;
        self.season_by_number(number)
    }

    /// Boundaries of season `number` (1-based).
    pub fn season_by_number(&self, number: SeasonNumber) -> EvermarkResult<Season> {
        if number == 0 {
            return Err(ValidationError::InvalidValue {
                field: "season".to_string(),
                reason: "seasons are numbered from 1".to_string(),
            }
            .into());
        }
        let period = self.config.period_chrono()?;
        let offset = period
            .checked_mul(i32::try_from(number - 1).unwrap_or(i32::MAX))
            .ok_or_else(|| {
                EvermarkError::invalid_configuration(format!("season {} is out of range", number))
            })?;
        let start = self
            .config
            .epoch
            .checked_add_signed(offset)
            .ok_or_else(|| {
                EvermarkError::invalid_configuration(format!("season {} is out of range", number))
            })?;
        let end = start.checked_add_signed(period).ok_or_else(|| {
            EvermarkError::invalid_configuration(format!("season {} is out of range", number))
        })?;
        Ok(Season { number, start, end })
    }

    /// The season containing `now`, served from cache while it still applies.
    pub fn current_season(&self, now: Timestamp) -> EvermarkResult<Season> {
        if let Some(season) = self.cached() {
            if season.contains(now) {
                return Ok(season);
            }
        }
        let season = self.season_for_date(now)?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(season);
        Ok(season)
    }

    /// True once `now` has reached the end of the cached current season.
    ///
    /// With an empty cache the current season is computed and cached, and
    /// there is nothing to transition from.
    pub fn should_transition(&self, now: Timestamp) -> EvermarkResult<bool> {
        match self.cached() {
            Some(season) => Ok(season.is_over(now)),
            None => {
                self.current_season(now)?;
                Ok(false)
            }
        }
    }

    pub fn cached(&self) -> Option<Season> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the cached season; the next lookup recomputes it.
    pub fn invalidate(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Compare a contract-reported season number with the derived season.
    pub fn cross_check(&self, derived: &Season, reported: SeasonNumber) -> SeasonCrossCheck {
        SeasonCrossCheck {
            derived: derived.number,
            reported,
            agrees: derived.number == reported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
    }

    fn oracle() -> SeasonOracle {
        SeasonOracle::new(SeasonConfig::weekly(epoch())).unwrap()
    }

    #[test]
    fn test_epoch_is_season_one() {
        let season = oracle().season_for_date(epoch()).unwrap();
        assert_eq!(season.number, 1);
        assert_eq!(season.start, epoch());
        assert_eq!(season.end, epoch() + Duration::weeks(1));
    }

    #[test]
    fn test_boundaries_are_half_open() {
        let oracle = oracle();
        let last_moment = epoch() + Duration::weeks(1) - Duration::milliseconds(1);
        assert_eq!(oracle.season_for_date(last_moment).unwrap().number, 1);
        assert_eq!(
            oracle
                .season_for_date(epoch() + Duration::weeks(1))
                .unwrap()
                .number,
            2
        );
        let tenth = oracle
            .season_for_date(epoch() + Duration::weeks(9) + Duration::days(3))
            .unwrap();
        assert_eq!(tenth.number, 10);
        assert_eq!(tenth.start, epoch() + Duration::weeks(9));
    }

    #[test]
    fn test_date_before_epoch_is_invalid_configuration() {
        let result = oracle().season_for_date(epoch() - Duration::days(1));
        assert!(matches!(
            result,
            Err(EvermarkError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_season_zero_rejected() {
        assert!(matches!(
            oracle().season_by_number(0),
            Err(EvermarkError::Validation(_))
        ));
    }

    #[test]
    fn test_should_transition_uses_cached_season() {
        let oracle = oracle();
        let now = epoch() + Duration::days(2);

        assert!(!oracle.should_transition(now).unwrap());
        assert_eq!(oracle.cached().map(|s| s.number), Some(1));

        let next_week = epoch() + Duration::weeks(1);
        assert!(oracle.should_transition(next_week).unwrap());

        oracle.invalidate();
        assert!(oracle.cached().is_none());
        assert_eq!(oracle.current_season(next_week).unwrap().number, 2);
        assert!(!oracle.should_transition(next_week).unwrap());
    }

    #[test]
    fn test_current_season_refreshes_stale_cache() {
        let oracle = oracle();
        oracle.current_season(epoch()).unwrap();
        let later = epoch() + Duration::weeks(3);
        assert_eq!(oracle.current_season(later).unwrap().number, 4);
    }

    #[test]
    fn test_cross_check() {
        let oracle = oracle();
        let season = oracle.season_by_number(5).unwrap();
        assert!(oracle.cross_check(&season, 5).agrees);
        let disagreement = oracle.cross_check(&season, 4);
        assert!(!disagreement.agrees);
        assert_eq!(disagreement.derived, 5);
        assert_eq!(disagreement.reported, 4);
    }

    proptest! {
        /// Every instant after the epoch falls in exactly one season, and
        /// consecutive seasons tile the timeline with no gap or overlap.
        #[test]
        fn prop_seasons_partition_time(
            period_secs in 60u64..=(60 * 24 * 3600),
            offset_ms in 0i64..(5 * 365 * 24 * 3600 * 1000),
        ) {
            let config = SeasonConfig::new(epoch(), std::time::Duration::from_secs(period_secs)).unwrap();
            let oracle = SeasonOracle::new(config).unwrap();
            let period = Duration::seconds(period_secs as i64);
            let date = epoch() + Duration::milliseconds(offset_ms);

            let season = oracle.season_for_date(date).unwrap();
            prop_assert!(season.start <= date && date < season.end);
            prop_assert_eq!(season.end - season.start, period);
            prop_assert_eq!(oracle.season_by_number(season.number).unwrap(), season);

            let next = oracle.season_by_number(season.number + 1).unwrap();
            prop_assert_eq!(next.start, season.end);
            prop_assert_eq!(oracle.season_for_date(season.end).unwrap().number, season.number + 1);
        }
    }
}
