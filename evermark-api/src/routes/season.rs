//! Season REST API Routes

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use evermark_core::{Season, SeasonNumber, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::state::AppState;

/// The contract's view of the current season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChainSeason {
    pub number: SeasonNumber,
    /// Whether the contract agrees with the date-derived season.
    pub agrees: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CurrentSeasonResponse {
    pub number: SeasonNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub start: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub end: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainSeason>,
}

impl CurrentSeasonResponse {
    fn new(season: Season, chain: Option<ChainSeason>) -> Self {
        Self {
            number: season.number,
            start: season.start,
            end: season.end,
            chain,
        }
    }
}

/// GET /seasons/current - Date-derived season with optional contract cross-check
#[utoipa::path(
    get,
    path = "/seasons/current",
    tag = "Seasons",
    responses(
        (status = 200, description = "Current season", body = CurrentSeasonResponse),
        (status = 500, description = "Season configuration is invalid", body = crate::error::ApiError),
    ),
)]
pub async fn current_season(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let season = state.oracle.current_season(Utc::now())?;

    let chain = match &state.chain {
        None => None,
        Some(reporter) => match reporter.reported_season().await {
            Ok(reported) => {
                let check = state.oracle.cross_check(&season, reported);
                if !check.agrees {
                    warn!(
                        derived = check.derived,
                        reported = check.reported,
                        "Season contract disagrees with date-derived season"
                    );
                }
                Some(ChainSeason {
                    number: check.reported,
                    agrees: check.agrees,
                })
            }
            Err(e) => {
                debug!(error = %e, "Season contract unavailable, omitting cross-check");
                None
            }
        },
    };

    Ok(Json(CurrentSeasonResponse::new(season, chain)))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/seasons/current", get(current_season))
}
