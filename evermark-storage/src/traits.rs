//! Async storage traits.
//!
//! The reconciler and the read API only see these traits; PostgreSQL and the
//! in-memory store both implement them.

use ::async_trait::async_trait;
use evermark_core::{
    EvermarkResult, Held, Item, ItemId, LeaderboardEntry, LeaderboardSnapshot, Lease, RunId,
    SeasonNumber, Timestamp, VoteId, VoteRecord,
};
use std::collections::HashMap;
use std::time::Duration;

/// One page of the vote ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VotePage {
    /// Votes ordered by `vote_id` ascending.
    pub votes: Vec<VoteRecord>,
    /// Cursor for the next page, `None` when the ledger is exhausted.
    pub next_cursor: Option<VoteId>,
}

/// Append-only vote ledger, the sole source of truth for totals.
#[async_trait]
pub trait VoteLedger: Send + Sync {
    /// Votes of `season` with `vote_id > after`, at most `limit` of them.
    ///
    /// Paging by vote id keeps pages stable while new votes are appended.
    async fn read_page(
        &self,
        season: SeasonNumber,
        after: Option<VoteId>,
        limit: usize,
    ) -> EvermarkResult<VotePage>;
}

/// Content items, used for owners (self-vote rule) and display metadata.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Items for the given ids. Missing ids are simply absent from the map.
    async fn items_by_ids(&self, ids: &[ItemId]) -> EvermarkResult<HashMap<ItemId, Item>>;
}

/// A window into a computed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPage {
    pub season: SeasonNumber,
    pub run_id: RunId,
    pub computed_at: Timestamp,
    pub total_entries: usize,
    pub entries: Vec<LeaderboardEntry>,
}

/// Denormalized leaderboard snapshots, one per season.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Atomically replace the season's snapshot.
    ///
    /// On error the previous snapshot must still be fully readable.
    async fn replace_snapshot(&self, snapshot: &LeaderboardSnapshot) -> EvermarkResult<()>;

    /// `None` when the season has never been computed.
    async fn snapshot_page(
        &self,
        season: SeasonNumber,
        offset: usize,
        limit: usize,
    ) -> EvermarkResult<Option<SnapshotPage>>;
}

/// Per-season exclusive leases for aggregation runs.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the season lease for `holder`.
    ///
    /// Fails with `WriteConflict` while another holder's lease is live. An
    /// expired lease is taken over.
    async fn try_acquire(
        &self,
        season: SeasonNumber,
        holder: &str,
        ttl: Duration,
    ) -> EvermarkResult<Lease<Held>>;

    /// Release a held lease. Releasing a lease that was already taken over
    /// is a no-op.
    async fn release(&self, lease: Lease<Held>) -> EvermarkResult<()>;
}
