//! In-memory implementation of every storage trait.
//!
//! Used by tests, the test-utils fixtures and local development. Supports
//! fault injection for the ledger (transient read failures) and for
//! snapshot writes (a crash partway through a replace).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use ::async_trait::async_trait;
use chrono::Utc;
use evermark_core::{
    Address, EvermarkError, EvermarkResult, Held, Item, ItemId, LeaderboardSnapshot, Lease,
    LeaseData, SeasonNumber, StorageError, Timestamp, TokenAmount, VoteId, VoteRecord,
};

use crate::traits::{ItemCatalog, LeaderboardStore, LeaseStore, SnapshotPage, VoteLedger, VotePage};

#[derive(Debug, Default)]
struct State {
    votes: BTreeMap<VoteId, VoteRecord>,
    next_vote_id: VoteId,
    items: HashMap<ItemId, Item>,
    snapshots: HashMap<SeasonNumber, LeaderboardSnapshot>,
    leases: HashMap<SeasonNumber, LeaseData>,
    faults: Faults,
    stats: StoreStats,
}

#[derive(Debug, Default)]
struct Faults {
    ledger_failures: u32,
    catalog_failures: u32,
    /// Fail the next snapshot write after this many entries were staged.
    crash_write_after: Option<usize>,
}

/// Call counters, for assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub ledger_pages_served: u64,
    pub ledger_failures_injected: u64,
    pub snapshot_writes: u64,
    pub snapshot_writes_failed: u64,
}

/// Shared in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StorageError> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StorageError> {
        self.state.write().map_err(|_| StorageError::LockPoisoned)
    }

    // ========================================================================
    // LEDGER / CATALOG WRITES
    // ========================================================================

    /// Append a vote; returns the assigned vote id.
    pub fn record_vote(
        &self,
        voter_id: Address,
        item_id: ItemId,
        season: SeasonNumber,
        amount: TokenAmount,
    ) -> EvermarkResult<VoteId> {
        self.record_vote_at(voter_id, item_id, season, amount, Utc::now())
    }

    pub fn record_vote_at(
        &self,
        voter_id: Address,
        item_id: ItemId,
        season: SeasonNumber,
        amount: TokenAmount,
        cast_at: Timestamp,
    ) -> EvermarkResult<VoteId> {
        let mut state = self.write()?;
        state.next_vote_id += 1;
        let vote_id = state.next_vote_id;
        state.votes.insert(
            vote_id,
            VoteRecord {
                vote_id,
                voter_id,
                item_id,
                season,
                amount,
                cast_at,
            },
        );
        Ok(vote_id)
    }

    /// Remove a vote (compensating correction).
    pub fn delete_vote(&self, vote_id: VoteId) -> EvermarkResult<bool> {
        Ok(self.write()?.votes.remove(&vote_id).is_some())
    }

    pub fn upsert_item(&self, item: Item) -> EvermarkResult<()> {
        self.write()?.items.insert(item.item_id, item);
        Ok(())
    }

    pub fn delete_item(&self, item_id: ItemId) -> EvermarkResult<bool> {
        Ok(self.write()?.items.remove(&item_id).is_some())
    }

    // ========================================================================
    // FAULT INJECTION
    // ========================================================================

    /// The next `count` ledger page reads fail with `SourceUnavailable`.
    pub fn fail_ledger_reads(&self, count: u32) {
        if let Ok(mut state) = self.write() {
            state.faults.ledger_failures = count;
        }
    }

    /// The next `count` catalog lookups fail with `SourceUnavailable`.
    pub fn fail_catalog_reads(&self, count: u32) {
        if let Ok(mut state) = self.write() {
            state.faults.catalog_failures = count;
        }
    }

    /// The next snapshot write crashes after staging `entries` rows.
    pub fn crash_next_write_after(&self, entries: usize) {
        if let Ok(mut state) = self.write() {
            state.faults.crash_write_after = Some(entries);
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.read().map(|s| s.stats).unwrap_or_default()
    }

    /// Full stored snapshot for a season.
    pub fn snapshot(&self, season: SeasonNumber) -> Option<LeaderboardSnapshot> {
        self.read().ok()?.snapshots.get(&season).cloned()
    }

    pub fn lease(&self, season: SeasonNumber) -> Option<LeaseData> {
        self.read().ok()?.leases.get(&season).cloned()
    }

    /// Plant a lease as if another runner held it.
    pub fn plant_lease(&self, data: LeaseData) -> EvermarkResult<()> {
        self.write()?.leases.insert(data.season, data);
        Ok(())
    }
}

#[async_trait]
impl VoteLedger for InMemoryStore {
    async fn read_page(
        &self,
        season: SeasonNumber,
        after: Option<VoteId>,
        limit: usize,
    ) -> EvermarkResult<VotePage> {
        let mut state = self.write()?;
        if state.faults.ledger_failures > 0 {
            state.faults.ledger_failures -= 1;
            state.stats.ledger_failures_injected += 1;
            return Err(EvermarkError::source_unavailable(
                "vote ledger",
                "injected ledger failure",
            ));
        }
        state.stats.ledger_pages_served += 1;

        let start = after.map_or(0, |c| c.saturating_add(1));
        let votes: Vec<VoteRecord> = state
            .votes
            .range(start..)
            .map(|(_, v)| v)
            .filter(|v| v.season == season)
            .take(limit)
            .cloned()
            .collect();
        let next_cursor = if votes.len() == limit {
            votes.last().map(|v| v.vote_id)
        } else {
            None
        };
        Ok(VotePage { votes, next_cursor })
    }
}

#[async_trait]
impl ItemCatalog for InMemoryStore {
    async fn items_by_ids(&self, ids: &[ItemId]) -> EvermarkResult<HashMap<ItemId, Item>> {
        let mut state = self.write()?;
        if state.faults.catalog_failures > 0 {
            state.faults.catalog_failures -= 1;
            return Err(EvermarkError::source_unavailable(
                "item catalog",
                "injected catalog failure",
            ));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.items.get(id).map(|item| (*id, item.clone())))
            .collect())
    }
}

#[async_trait]
impl LeaderboardStore for InMemoryStore {
    async fn replace_snapshot(&self, snapshot: &LeaderboardSnapshot) -> EvermarkResult<()> {
        let mut state = self.write()?;
        state.stats.snapshot_writes += 1;

        // Stage rows; the visible snapshot is swapped only when all are in.
        let crash_after = state.faults.crash_write_after.take();
        let mut staged = Vec::with_capacity(snapshot.entries.len());
        for entry in snapshot.entries.iter().map(Some).chain(std::iter::once(None)) {
            if crash_after == Some(staged.len()) {
                state.stats.snapshot_writes_failed += 1;
                return Err(StorageError::WriteFailed {
                    season: snapshot.season,
                    reason: format!("simulated crash after {} rows", staged.len()),
                }
                .into());
            }
            if let Some(entry) = entry {
                staged.push(entry.clone());
            }
        }

        state.snapshots.insert(
            snapshot.season,
            LeaderboardSnapshot {
                entries: staged,
                ..snapshot.clone()
            },
        );
        Ok(())
    }

    async fn snapshot_page(
        &self,
        season: SeasonNumber,
        offset: usize,
        limit: usize,
    ) -> EvermarkResult<Option<SnapshotPage>> {
        let state = self.read()?;
        Ok(state.snapshots.get(&season).map(|snapshot| SnapshotPage {
            season,
            run_id: snapshot.run_id,
            computed_at: snapshot.computed_at,
            total_entries: snapshot.entries.len(),
            entries: snapshot
                .entries
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
        }))
    }
}

#[async_trait]
impl LeaseStore for InMemoryStore {
    async fn try_acquire(
        &self,
        season: SeasonNumber,
        holder: &str,
        ttl: Duration,
    ) -> EvermarkResult<Lease<Held>> {
        let now = Utc::now();
        let mut state = self.write()?;
        if let Some(existing) = state.leases.get(&season) {
            if !existing.is_expired(now) {
                return Err(EvermarkError::WriteConflict {
                    season,
                    holder: existing.holder.clone(),
                });
            }
        }
        let data = LeaseData::new(season, holder, now, ttl);
        state.leases.insert(season, data.clone());
        Ok(Lease::new(data))
    }

    async fn release(&self, lease: Lease<Held>) -> EvermarkResult<()> {
        let data = lease.release();
        let mut state = self.write()?;
        if state
            .leases
            .get(&data.season)
            .is_some_and(|current| current.lease_id == data.lease_id)
        {
            state.leases.remove(&data.season);
        }
        Ok(())
    }
}
