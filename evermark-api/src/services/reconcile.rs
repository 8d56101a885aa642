//! Reconciliation Service
//!
//! One aggregation run for one season:
//!
//! 1. take the season lease (a live lease held elsewhere is a `WriteConflict`)
//! 2. drain the vote ledger by cursor
//! 3. load the referenced items, drop self-votes and dangling references
//! 4. aggregate, rank and atomically replace the season snapshot
//! 5. invalidate cached pages of the season and release the lease
//!
//! Steps 2-4 run under the run timeout. Retryable failures re-run the whole
//! attempt with backoff; the previous snapshot stays readable throughout.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use evermark_core::{
    build_snapshot, filter_votes, new_run_id, EvermarkError, EvermarkResult, ItemId,
    LeaderboardEntry, ReconcileConfig, RunId, SeasonNumber, Timestamp,
};
use evermark_storage::{
    read_votes, ItemCatalog, LeaderboardStore, LeaseStore, ReadOptions, SnapshotCache, VoteLedger,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::constants::TOP_ENTRIES;
use crate::telemetry::metrics;

/// What started a run. Used as a metrics label and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    /// `POST /leaderboard/refresh`
    Manual,
    /// Periodic refresh of the current season.
    Scheduled,
    /// Final run for a season that just ended.
    Transition,
    /// The `reaggregate` binary.
    Cli,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Manual => "manual",
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Transition => "transition",
            RunTrigger::Cli => "cli",
        }
    }
}

/// Summary of a committed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub season: SeasonNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub run_id: RunId,
    pub entries_written: usize,
    pub top_entries: Vec<LeaderboardEntry>,
    pub dangling_references: usize,
    pub self_votes_excluded: usize,
    pub votes_read: usize,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub computed_at: Timestamp,
    /// Content digest of the written entries; equal across idempotent runs.
    pub digest: String,
    pub attempts: u32,
}

fn outcome_label(result: &EvermarkResult<RunReport>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(EvermarkError::WriteConflict { .. }) => "conflict",
        Err(EvermarkError::Timeout { .. }) => "timeout",
        Err(_) => "failure",
    }
}

fn default_holder() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "evermark".to_string());
    format!("{}:{}", host, Uuid::now_v7())
}

/// Runs aggregation for a season against the storage traits.
pub struct LeaderboardReconciler {
    ledger: Arc<dyn VoteLedger>,
    catalog: Arc<dyn ItemCatalog>,
    store: Arc<dyn LeaderboardStore>,
    leases: Arc<dyn LeaseStore>,
    cache: Option<Arc<SnapshotCache>>,
    config: ReconcileConfig,
    holder: String,
}

impl LeaderboardReconciler {
    pub fn new(
        ledger: Arc<dyn VoteLedger>,
        catalog: Arc<dyn ItemCatalog>,
        store: Arc<dyn LeaderboardStore>,
        leases: Arc<dyn LeaseStore>,
        config: ReconcileConfig,
    ) -> EvermarkResult<Self> {
        config.validate()?;
        Ok(Self {
            ledger,
            catalog,
            store,
            leases,
            cache: None,
            config,
            holder: default_holder(),
        })
    }

    /// Build over one backend implementing every storage trait.
    pub fn from_backend<B>(backend: Arc<B>, config: ReconcileConfig) -> EvermarkResult<Self>
    where
        B: VoteLedger + ItemCatalog + LeaderboardStore + LeaseStore + 'static,
    {
        Self::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend,
            config,
        )
    }

    /// Invalidate `cache` for a season after each commit.
    pub fn with_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Lease holder name, unique per process by default.
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Re-aggregate `season` and replace its snapshot.
    ///
    /// # Errors
    ///
    /// - `WriteConflict` when another runner holds the season lease (not retried)
    /// - `Timeout` when an attempt exceeds `run_timeout` (not retried)
    /// - `SourceUnavailable` / `Storage` once `run_attempts` are exhausted
    pub async fn run(&self, season: SeasonNumber, trigger: RunTrigger) -> EvermarkResult<RunReport> {
        let started = Instant::now();
        let mut attempt = 0u32;

        let result = loop {
            attempt += 1;
            match self.attempt(season, attempt).await {
                Ok(report) => break Ok(report),
                Err(err) if err.is_retryable() && attempt < self.config.run_attempts => {
                    let delay = self.config.retry.backoff_for(attempt);
                    warn!(
                        season,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Aggregation attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break Err(err),
            }
        };

        let outcome = outcome_label(&result);
        if let Some(metrics) = metrics() {
            metrics.record_aggregation_run(trigger.as_str(), outcome, started.elapsed().as_secs_f64());
            if let Ok(report) = &result {
                metrics.record_run_counts(
                    report.entries_written,
                    report.dangling_references,
                    report.self_votes_excluded,
                    report.votes_read,
                );
            }
        }

        match &result {
            Ok(_) => {}
            Err(EvermarkError::WriteConflict { holder, .. }) => {
                debug!(season, holder = %holder, trigger = trigger.as_str(), "Aggregation already running")
            }
            Err(err) => {
                warn!(season, attempts = attempt, trigger = trigger.as_str(), error = %err, "Aggregation failed")
            }
        }

        result
    }

    async fn attempt(&self, season: SeasonNumber, attempt: u32) -> EvermarkResult<RunReport> {
        let lease = self
            .leases
            .try_acquire(season, &self.holder, self.config.lease_ttl)
            .await?;
        let run_id = new_run_id();

        let outcome = tokio::time::timeout(self.config.run_timeout, self.aggregate_and_commit(season, run_id))
            .await;

        if let Err(err) = self.leases.release(lease).await {
            // The lease expires on its own; a failed release only delays the next run.
            warn!(season, run_id = %run_id, error = %err, "Failed to release season lease");
        }

        match outcome {
            Ok(result) => result.map(|report| RunReport { attempts: attempt, ..report }),
            Err(_) => Err(EvermarkError::Timeout {
                operation: format!("aggregate season {}", season),
                elapsed_ms: self.config.run_timeout.as_millis() as u64,
            }),
        }
    }

    async fn aggregate_and_commit(&self, season: SeasonNumber, run_id: RunId) -> EvermarkResult<RunReport> {
        let span = info_span!("aggregation_run", season, run_id = %run_id);

        async move {
            let options = ReadOptions {
                page_size: self.config.page_size,
                retry: self.config.retry.clone(),
            };
            let read = read_votes(self.ledger.as_ref(), season, &options).await?;
            let votes_read = read.votes.len();
            debug!(votes_read, pages = read.pages, retries = read.retries, "Ledger drained");

            let mut item_ids: Vec<ItemId> = read.votes.iter().map(|v| v.item_id).collect();
            item_ids.sort_unstable();
            item_ids.dedup();
            let items = self.catalog.items_by_ids(&item_ids).await?;

            let filtered = filter_votes(read.votes, &items);
            for dangling in &filtered.dangling {
                warn!(
                    vote_id = dangling.vote_id,
                    item_id = dangling.item_id,
                    "Skipping vote for missing item"
                );
            }

            let snapshot = build_snapshot(season, &filtered.kept, run_id, Utc::now());
            self.store.replace_snapshot(&snapshot).await?;

            if let Some(cache) = &self.cache {
                cache.invalidate(season).await;
            }

            let report = RunReport {
                season,
                run_id,
                entries_written: snapshot.entries.len(),
                top_entries: snapshot.top(TOP_ENTRIES).to_vec(),
                dangling_references: filtered.dangling.len(),
                self_votes_excluded: filtered.self_votes_excluded,
                votes_read,
                computed_at: snapshot.computed_at,
                digest: snapshot.digest(),
                attempts: 1,
            };

            info!(
                entries_written = report.entries_written,
                votes_read,
                self_votes_excluded = report.self_votes_excluded,
                dangling_references = report.dangling_references,
                "Leaderboard snapshot committed"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evermark_core::{Address, Item, LeaseData, RetryConfig, TokenAmount};
    use evermark_storage::InMemoryStore;
    use std::time::Duration;

    fn addr(raw: &str) -> Address {
        Address::parse(raw).unwrap()
    }

    fn fast_config() -> ReconcileConfig {
        ReconcileConfig {
            page_size: 2,
            retry: RetryConfig::none(),
            run_attempts: 1,
            ..ReconcileConfig::default()
        }
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (item_id, owner) in [(1, "0xowner1"), (2, "0xowner2")] {
            store
                .upsert_item(Item {
                    item_id,
                    owner_id: addr(owner),
                    title: format!("item {}", item_id),
                    metadata: serde_json::json!({}),
                })
                .unwrap();
        }
        store.record_vote(addr("0xalice"), 1, 1, TokenAmount::from(10)).unwrap();
        store.record_vote(addr("0xbob"), 2, 1, TokenAmount::from(30)).unwrap();
        store.record_vote(addr("0xOWNER1"), 1, 1, TokenAmount::from(1000)).unwrap();
        store.record_vote(addr("0xcarol"), 9, 1, TokenAmount::from(5)).unwrap();
        store
    }

    #[test]
    fn test_trigger_labels() {
        assert_eq!(RunTrigger::Manual.as_str(), "manual");
        assert_eq!(RunTrigger::Transition.as_str(), "transition");
    }

    #[test]
    fn test_rejects_invalid_config() {
        let store = Arc::new(InMemoryStore::new());
        let config = ReconcileConfig {
            page_size: 0,
            ..ReconcileConfig::default()
        };
        assert!(LeaderboardReconciler::from_backend(store, config).is_err());
    }

    #[tokio::test]
    async fn test_run_filters_and_ranks() {
        let store = seeded();
        let reconciler = LeaderboardReconciler::from_backend(Arc::new(store.clone()), fast_config()).unwrap();

        let report = reconciler.run(1, RunTrigger::Manual).await.unwrap();

        assert_eq!(report.votes_read, 4);
        assert_eq!(report.self_votes_excluded, 1);
        assert_eq!(report.dangling_references, 1);
        assert_eq!(report.entries_written, 2);
        assert_eq!(report.top_entries[0].item_id, 2);
        assert_eq!(report.top_entries[1].total_votes, TokenAmount::from(10));
        assert_eq!(report.attempts, 1);

        let snapshot = store.snapshot(1).unwrap();
        assert_eq!(snapshot.run_id, report.run_id);
        assert!(store.lease(1).is_none(), "lease must be released");
    }

    #[tokio::test]
    async fn test_live_lease_is_a_conflict() {
        let store = seeded();
        store
            .plant_lease(LeaseData::new(1, "other-runner", Utc::now(), Duration::from_secs(60)))
            .unwrap();
        let reconciler = LeaderboardReconciler::from_backend(Arc::new(store.clone()), fast_config()).unwrap();

        let err = reconciler.run(1, RunTrigger::Scheduled).await.unwrap_err();
        assert!(matches!(err, EvermarkError::WriteConflict { ref holder, .. } if holder == "other-runner"));
        assert!(store.snapshot(1).is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let store = seeded();
        let long_ago = Utc::now() - chrono::Duration::hours(1);
        store
            .plant_lease(LeaseData::new(1, "crashed-runner", long_ago, Duration::from_secs(60)))
            .unwrap();
        let reconciler = LeaderboardReconciler::from_backend(Arc::new(store.clone()), fast_config()).unwrap();

        assert!(reconciler.run(1, RunTrigger::Scheduled).await.is_ok());
    }

    #[tokio::test]
    async fn test_cache_invalidated_after_commit() {
        let store = seeded();
        let cache = Arc::new(SnapshotCache::new(Arc::new(store.clone()), 8));
        let freshness = evermark_storage::Freshness::best_effort(Duration::from_secs(3600));

        assert!(cache.snapshot_page(1, 0, 10, &freshness).await.unwrap().value().is_none());

        let reconciler = LeaderboardReconciler::from_backend(Arc::new(store), fast_config())
            .unwrap()
            .with_cache(cache.clone());
        reconciler.run(1, RunTrigger::Manual).await.unwrap();

        let page = cache.snapshot_page(1, 0, 10, &freshness).await.unwrap();
        assert!(!page.was_cache_hit());
        assert_eq!(page.value().as_ref().map(|p| p.total_entries), Some(2));
    }
}
