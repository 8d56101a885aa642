//! Constants for the Evermark API
//!
//! Centralized defaults for the HTTP surface and the season job.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Header carrying an admin API key for the refresh trigger.
pub const API_KEY_HEADER: &str = "x-api-key";

// ============================================================================
// PAGINATION
// ============================================================================

/// Default number of leaderboard entries per page
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Maximum number of leaderboard entries per page
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Entries echoed back by a refresh.
pub const TOP_ENTRIES: usize = 10;

// ============================================================================
// CACHE
// ============================================================================

/// Default staleness bound for cached leaderboard pages (seconds)
pub const DEFAULT_CACHE_MAX_STALENESS_SECS: u64 = 30;

/// Maximum number of cached leaderboard pages
pub const DEFAULT_CACHE_MAX_PAGES: usize = 512;

// ============================================================================
// SEASON JOB
// ============================================================================

/// Default interval between background season refreshes (seconds)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

// ============================================================================
// CHAIN
// ============================================================================

/// Timeout for the season contract JSON-RPC call (seconds)
pub const CHAIN_RPC_TIMEOUT_SECS: u64 = 5;
