//! Evermark API - Leaderboard reconciliation service
//!
//! Serves season leaderboards over HTTP, runs the reconciliation that
//! rebuilds them from the vote ledger, and keeps the current season fresh
//! from a background job. PostgreSQL backs every storage trait in
//! production; `evermark_storage::InMemoryStore` backs the tests.

pub mod auth;
pub mod chain;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::AdminAuth;
pub use chain::{ChainClient, ChainConfig, SeasonReporter};
pub use config::{reconcile_config_from_env, season_config_from_env, ApiConfig};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::{create_router, HealthCheck};
pub use services::{LeaderboardReconciler, LeaderboardView, RunReport, RunTrigger};
pub use state::AppState;
