//! OpenAPI Specification for the Evermark leaderboard API
//!
//! Generated by utoipa from the route annotations and response types.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use evermark_core::{Address, LeaderboardEntry, Season, TokenAmount};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{health, leaderboard, season};
use crate::services::{LeaderboardRow, LeaderboardView, SnapshotStatus};
use crate::telemetry::metrics;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Evermark Leaderboard API",
        version = "0.3.0",
        description = "Seasonal vote aggregation and leaderboard snapshots for Evermark",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Leaderboard", description = "Season leaderboard reads and refresh trigger"),
        (name = "Seasons", description = "Season boundaries and contract cross-check"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics"),
    ),
    paths(
        leaderboard::get_leaderboard,
        leaderboard::refresh_leaderboard,
        season::current_season,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            LeaderboardView, LeaderboardRow, SnapshotStatus, LeaderboardEntry,
            TokenAmount, Address, Season,
            leaderboard::RefreshRequest, leaderboard::RefreshResponse,
            season::CurrentSeasonResponse, season::ChainSeason,
            health::HealthResponse, health::HealthStatus, health::HealthDetails,
            health::ComponentHealth,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the admin key scheme used by the refresh trigger.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
