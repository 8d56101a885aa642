//! Season Refresh Background Task
//!
//! Periodically re-aggregates the current season and finalizes seasons as
//! they end. Each tick:
//!
//! 1. asks the oracle whether the cached season is over
//! 2. if so, invalidates the oracle and queues a final run for the ending
//!    season
//! 3. derives the current season and reconciles it
//!
//! A season that ended between two ticks is also finalized when the oracle
//! cache was refreshed elsewhere (for example by a read request), because
//! the refresher remembers the last season it reconciled.
//!
//! # Configuration
//!
//! - `EVERMARK_REFRESH_INTERVAL_SECS`: Tick interval (default: 300)
//! - `EVERMARK_REFRESH_ENABLED`: "false" disables the task (default: true)

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use evermark_core::{EvermarkError, EvermarkResult, SeasonNumber, SeasonOracle, Timestamp};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::DEFAULT_REFRESH_INTERVAL_SECS;
use crate::services::{LeaderboardReconciler, RunReport, RunTrigger};
use crate::telemetry::metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the season refresh task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRefreshConfig {
    /// How often to reconcile the current season (default: 300 seconds)
    pub refresh_interval: Duration,
    /// Whether the task runs at all (default: true)
    pub enabled: bool,
}

impl Default for SeasonRefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            enabled: true,
        }
    }
}

impl SeasonRefreshConfig {
    /// Create SeasonRefreshConfig from environment variables.
    pub fn from_env() -> Self {
        let refresh_interval = Duration::from_secs(
            std::env::var("EVERMARK_REFRESH_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
        );
        let enabled = std::env::var("EVERMARK_REFRESH_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            refresh_interval,
            enabled,
        }
    }

    /// Short interval for local development.
    pub fn development() -> Self {
        Self {
            refresh_interval: Duration::from_secs(15),
            enabled: true,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the refresh task.
#[derive(Debug, Default)]
pub struct SeasonRefreshMetrics {
    /// Ticks processed since startup
    pub ticks: AtomicU64,
    /// Runs that committed a snapshot
    pub runs: AtomicU64,
    /// Runs that failed (conflicts excluded)
    pub failures: AtomicU64,
    /// Runs skipped because another runner held the lease
    pub conflicts: AtomicU64,
    /// Seasons finalized after they ended
    pub transitions: AtomicU64,
}

impl SeasonRefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> SeasonRefreshSnapshot {
        SeasonRefreshSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of refresh counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonRefreshSnapshot {
    pub ticks: u64,
    pub runs: u64,
    pub failures: u64,
    pub conflicts: u64,
    pub transitions: u64,
}

// ============================================================================
// REFRESHER
// ============================================================================

/// Tick logic of the task, separated so it can be driven with explicit
/// timestamps.
pub struct SeasonRefresher {
    reconciler: Arc<LeaderboardReconciler>,
    oracle: Arc<SeasonOracle>,
    metrics: Arc<SeasonRefreshMetrics>,
    last_season: Option<SeasonNumber>,
    /// Ended seasons whose final run has not committed yet.
    pending_final: BTreeSet<SeasonNumber>,
}

impl SeasonRefresher {
    pub fn new(reconciler: Arc<LeaderboardReconciler>, oracle: Arc<SeasonOracle>) -> Self {
        Self {
            reconciler,
            oracle,
            metrics: Arc::new(SeasonRefreshMetrics::new()),
            last_season: None,
            pending_final: BTreeSet::new(),
        }
    }

    pub fn metrics(&self) -> Arc<SeasonRefreshMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process one tick at `now`.
    pub async fn tick(&mut self, now: Timestamp) {
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.tick_inner(now).await {
            tracing::error!(error = %e, "Season refresh tick failed");
            self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn tick_inner(&mut self, now: Timestamp) -> EvermarkResult<()> {
        let mut ending = None;
        if self.oracle.should_transition(now)? {
            ending = self.oracle.cached().map(|season| season.number);
            self.oracle.invalidate();
        }

        let current = self.oracle.current_season(now)?;
        if let Some(m) = metrics() {
            m.set_current_season(current.number);
        }

        if ending.is_none() {
            ending = self.last_season.filter(|last| *last < current.number);
        }
        if let Some(ended) = ending.filter(|n| *n < current.number) {
            tracing::info!(ended_season = ended, current_season = current.number, "Season transition");
            self.pending_final.insert(ended);
        }
        self.last_season = Some(current.number);

        let pending: Vec<SeasonNumber> = self.pending_final.iter().copied().collect();
        for ended in pending {
            let result = self.reconciler.run(ended, RunTrigger::Transition).await;
            let settled = matches!(result, Ok(_) | Err(EvermarkError::WriteConflict { .. }));
            if result.is_ok() {
                self.metrics.transitions.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = metrics() {
                    m.record_season_transition();
                }
            }
            self.record(result);
            if settled {
                self.pending_final.remove(&ended);
            }
        }

        let result = self.reconciler.run(current.number, RunTrigger::Scheduled).await;
        self.record(result);
        Ok(())
    }

    fn record(&self, result: EvermarkResult<RunReport>) {
        match result {
            Ok(_) => {
                self.metrics.runs.fetch_add(1, Ordering::Relaxed);
            }
            Err(EvermarkError::WriteConflict { .. }) => {
                self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that keeps the current season's leaderboard fresh.
///
/// Runs until the shutdown signal is received and returns the counters
/// collected during its lifetime.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(season_refresh_task(reconciler, oracle, config, shutdown_rx));
/// // On shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn season_refresh_task(
    reconciler: Arc<LeaderboardReconciler>,
    oracle: Arc<SeasonOracle>,
    config: SeasonRefreshConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SeasonRefreshMetrics> {
    let mut refresher = SeasonRefresher::new(reconciler, oracle);
    let metrics = refresher.metrics();

    if !config.enabled {
        tracing::info!("Season refresh task disabled");
        return metrics;
    }

    let mut refresh_interval = interval(config.refresh_interval);
    refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        refresh_interval_secs = config.refresh_interval.as_secs(),
        "Season refresh task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Season refresh task shutting down");
                    break;
                }
            }

            _ = refresh_interval.tick() => {
                refresher.tick(Utc::now()).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        ticks = snapshot.ticks,
        runs = snapshot.runs,
        failures = snapshot.failures,
        conflicts = snapshot.conflicts,
        transitions = snapshot.transitions,
        "Season refresh task completed"
    );

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use evermark_core::{
        Address, Item, LeaseData, ReconcileConfig, RetryConfig, SeasonConfig, TokenAmount,
    };
    use evermark_storage::InMemoryStore;

    const DAY: Duration = Duration::from_secs(86_400);

    fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
    }

    fn setup() -> (InMemoryStore, SeasonRefresher) {
        let store = InMemoryStore::new();
        store
            .upsert_item(Item {
                item_id: 1,
                owner_id: Address::parse("0xowner").unwrap(),
                title: "cast".to_string(),
                metadata: serde_json::json!({}),
            })
            .unwrap();
        store
            .record_vote(Address::parse("0xvoter").unwrap(), 1, 1, TokenAmount::from(5))
            .unwrap();

        let config = ReconcileConfig {
            retry: RetryConfig::none(),
            run_attempts: 1,
            ..ReconcileConfig::default()
        };
        let reconciler =
            Arc::new(LeaderboardReconciler::from_backend(Arc::new(store.clone()), config).unwrap());
        let oracle = Arc::new(SeasonOracle::new(SeasonConfig::new(epoch(), DAY).unwrap()).unwrap());
        (store, SeasonRefresher::new(reconciler, oracle))
    }

    fn at_hours(hours: i64) -> Timestamp {
        epoch() + chrono::Duration::hours(hours)
    }

    #[test]
    fn test_config_default() {
        let config = SeasonRefreshConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS));
        assert!(config.enabled);
        assert_eq!(SeasonRefreshConfig::development().refresh_interval, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_tick_reconciles_current_season() {
        let (store, mut refresher) = setup();

        refresher.tick(at_hours(1)).await;

        let snapshot = refresher.metrics().snapshot();
        assert_eq!(snapshot.ticks, 1);
        assert_eq!(snapshot.runs, 1);
        assert_eq!(snapshot.transitions, 0);
        assert_eq!(store.snapshot(1).unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_finalizes_ending_season() {
        let (store, mut refresher) = setup();
        refresher.tick(at_hours(1)).await;

        // A late vote for season 1, then season 2 begins.
        store
            .record_vote(Address::parse("0xlate").unwrap(), 1, 1, TokenAmount::from(7))
            .unwrap();
        refresher.tick(at_hours(25)).await;

        let snapshot = refresher.metrics().snapshot();
        assert_eq!(snapshot.transitions, 1);
        assert_eq!(snapshot.runs, 3);
        assert_eq!(
            store.snapshot(1).unwrap().entries[0].total_votes,
            TokenAmount::from(12)
        );
        assert!(store.snapshot(2).is_some());
    }

    #[tokio::test]
    async fn test_transition_detected_after_external_cache_refresh() {
        let (store, mut refresher) = setup();
        refresher.tick(at_hours(1)).await;

        // A read request already moved the oracle to season 2.
        refresher.oracle.current_season(at_hours(26)).unwrap();
        refresher.tick(at_hours(26)).await;

        assert_eq!(refresher.metrics().snapshot().transitions, 1);
        assert!(store.snapshot(2).is_some());
    }

    #[tokio::test]
    async fn test_conflict_is_counted_not_failed() {
        let (store, mut refresher) = setup();
        store
            .plant_lease(LeaseData::new(1, "elsewhere", Utc::now(), Duration::from_secs(600)))
            .unwrap();

        refresher.tick(at_hours(1)).await;

        let snapshot = refresher.metrics().snapshot();
        assert_eq!(snapshot.conflicts, 1);
        assert_eq!(snapshot.failures, 0);
    }

    #[tokio::test]
    async fn test_failed_final_run_is_retried_next_tick() {
        let (store, mut refresher) = setup();
        refresher.tick(at_hours(1)).await;

        store.fail_ledger_reads(1);
        refresher.tick(at_hours(25)).await;
        assert_eq!(refresher.metrics().snapshot().transitions, 0);

        refresher.tick(at_hours(26)).await;
        assert_eq!(refresher.metrics().snapshot().transitions, 1);
    }

    #[tokio::test]
    async fn test_unfinished_seasons_accumulate_until_finalized() {
        let (store, mut refresher) = setup();
        refresher.tick(at_hours(1)).await;
        store
            .record_vote(Address::parse("0xlate").unwrap(), 1, 1, TokenAmount::from(7))
            .unwrap();

        // Final run of season 1 and the first run of season 2 both fail.
        store.fail_ledger_reads(2);
        refresher.tick(at_hours(25)).await;
        assert_eq!(refresher.metrics().snapshot().transitions, 0);

        // Season 2 ends before season 1 was finalized; both settle now.
        refresher.tick(at_hours(49)).await;
        assert_eq!(refresher.metrics().snapshot().transitions, 2);
        assert_eq!(
            store.snapshot(1).unwrap().entries[0].total_votes,
            TokenAmount::from(12)
        );
        assert!(store.snapshot(2).is_some());
        assert!(store.snapshot(3).is_some());
        assert!(refresher.pending_final.is_empty());
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown() {
        let (_store, refresher) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = SeasonRefreshConfig {
            refresh_interval: Duration::from_secs(3600),
            enabled: true,
        };

        let handle = tokio::spawn(season_refresh_task(
            refresher.reconciler.clone(),
            refresher.oracle.clone(),
            config,
            shutdown_rx,
        ));
        shutdown_tx.send(true).unwrap();

        let metrics = handle.await.unwrap();
        assert!(metrics.snapshot().ticks <= 1);
    }

    #[tokio::test]
    async fn test_disabled_task_returns_immediately() {
        let (_store, refresher) = setup();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = SeasonRefreshConfig {
            refresh_interval: Duration::from_secs(1),
            enabled: false,
        };

        let metrics = season_refresh_task(
            refresher.reconciler.clone(),
            refresher.oracle.clone(),
            config,
            shutdown_rx,
        )
        .await;
        assert_eq!(metrics.snapshot().ticks, 0);
    }
}
