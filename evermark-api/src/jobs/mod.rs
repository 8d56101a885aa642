//! Background Jobs for the Evermark API
//!
//! - `season_refresh`: keeps the current season's leaderboard fresh and
//!   finalizes seasons as they end
//!
//! # Usage
//!
//! ```ignore
//! use evermark_api::jobs::{season_refresh_task, SeasonRefreshConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(season_refresh_task(reconciler, oracle, SeasonRefreshConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod season_refresh;

pub use season_refresh::{
    season_refresh_task, SeasonRefreshConfig, SeasonRefreshMetrics, SeasonRefreshSnapshot,
    SeasonRefresher,
};
