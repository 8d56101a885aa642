//! Service Layer
//!
//! Reconciliation runs and the leaderboard read model, kept independent of
//! the HTTP handlers so the job and the CLI share them.

mod leaderboard;
mod reconcile;

pub use leaderboard::*;
pub use reconcile::*;
