//! Evermark Core - Leaderboard Types and Reconciliation Logic
//!
//! Pure data structures and pure functions. All other crates depend on this.
//! Nothing in this crate performs I/O: the ledger reader, snapshot store and
//! HTTP surface live in `evermark-storage` and `evermark-api`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod address;
pub mod aggregate;
pub mod amount;
pub mod config;
pub mod entities;
pub mod error;
pub mod filter;
pub mod lease;
pub mod season;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Evermark token id of a content item.
pub type ItemId = i64;

/// Store-assigned, strictly increasing vote identifier.
pub type VoteId = i64;

/// 1-based season number.
pub type SeasonNumber = u32;

/// Identifier of one aggregation run (UUIDv7, timestamp-sortable).
pub type RunId = Uuid;

/// Generate a new run identifier.
pub fn new_run_id() -> RunId {
    Uuid::now_v7()
}

pub use address::Address;
pub use aggregate::{aggregate, build_snapshot, rank, ItemTally};
pub use amount::TokenAmount;
pub use config::{ReconcileConfig, RetryConfig, SeasonConfig};
pub use entities::{Item, LeaderboardEntry, LeaderboardSnapshot, VoteRecord};
pub use error::{EvermarkError, EvermarkResult, StorageError, ValidationError};
pub use filter::{filter_votes, DanglingReference, FilterOutcome};
pub use lease::{Held, Lease, LeaseData, LeaseStateError, StoredLease};
pub use season::{Season, SeasonCrossCheck, SeasonOracle};
