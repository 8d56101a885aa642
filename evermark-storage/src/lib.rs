//! Evermark Storage - Storage Traits, Ledger Reader and In-Memory Store
//!
//! Defines the storage seams of the leaderboard job. The PostgreSQL
//! implementation lives in evermark-api.

pub mod cache;
pub mod ledger;
pub mod memory;
pub mod traits;

pub use cache::{CacheRead, CacheStats, Freshness, SnapshotCache};
pub use ledger::{read_votes, LedgerRead, ReadOptions};
pub use memory::{InMemoryStore, StoreStats};
pub use traits::{ItemCatalog, LeaderboardStore, LeaseStore, SnapshotPage, VoteLedger, VotePage};
