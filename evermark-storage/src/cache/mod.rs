//! Leaderboard read cache with explicit freshness.
//!
//! Callers state how stale a read may be via [`Freshness`]; reads come back
//! as [`CacheRead<T>`] carrying when the value was fetched and whether it was
//! a hit. The reconciler invalidates a season after every committed run.
//!
//! ```ignore
//! let read = cache
//!     .snapshot_page(season, 0, 50, &Freshness::best_effort(Duration::from_secs(30)))
//!     .await?;
//! if read.was_cache_hit() { /* at most 30s old */ }
//! ```

pub mod freshness;
pub mod snapshot;

pub use freshness::{CacheRead, Freshness};
pub use snapshot::{CacheStats, SnapshotCache};
