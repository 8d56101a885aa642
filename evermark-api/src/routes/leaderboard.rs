//! Leaderboard REST API Routes
//!
//! Reads are served from the committed snapshot through the page cache and
//! never surface internal error kinds: every failure is a 503. The refresh
//! trigger runs the reconciler inline and reports what it wrote.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use evermark_core::{LeaderboardEntry, RunId, SeasonNumber, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::error::{ApiError, ApiResult};
use crate::services::{load_leaderboard, LeaderboardView, RunReport, RunTrigger};
use crate::state::AppState;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Query parameters of `GET /leaderboard`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct LeaderboardQuery {
    /// Season number; defaults to the current season.
    pub season: Option<SeasonNumber>,
    pub offset: Option<usize>,
    /// Page size, 1 to 1000.
    pub limit: Option<usize>,
}

/// Body of `POST /leaderboard/refresh`. The body itself is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RefreshRequest {
    pub season: Option<SeasonNumber>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub season: SeasonNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub run_id: RunId,
    pub entries_written: usize,
    pub top_entries: Vec<LeaderboardEntry>,
    pub dangling_references: usize,
    pub self_votes_excluded: usize,
    pub votes_read: usize,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub computed_at: Timestamp,
}

impl From<RunReport> for RefreshResponse {
    fn from(report: RunReport) -> Self {
        Self {
            success: true,
            season: report.season,
            run_id: report.run_id,
            entries_written: report.entries_written,
            top_entries: report.top_entries,
            dangling_references: report.dangling_references,
            self_votes_excluded: report.self_votes_excluded,
            votes_read: report.votes_read,
            computed_at: report.computed_at,
        }
    }
}

fn validate_season(season: Option<SeasonNumber>) -> ApiResult<Option<SeasonNumber>> {
    match season {
        Some(0) => Err(ApiError::invalid_input("season numbers start at 1")),
        other => Ok(other),
    }
}

fn validate_limit(limit: Option<usize>) -> ApiResult<usize> {
    match limit {
        None => Ok(DEFAULT_PAGE_LIMIT),
        Some(n) if (1..=MAX_PAGE_LIMIT).contains(&n) => Ok(n),
        Some(_) => Err(ApiError::invalid_range("limit", 1, MAX_PAGE_LIMIT)),
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /leaderboard - Ranked entries of a season
#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "Leaderboard",
    params(LeaderboardQuery),
    responses(
        (status = 200, description = "Leaderboard page", body = LeaderboardView),
        (status = 400, description = "Invalid season or page bounds", body = ApiError),
        (status = 503, description = "Leaderboard temporarily unavailable", body = ApiError),
    ),
)]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    params: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params?;
    let season = validate_season(params.season)?;
    let limit = validate_limit(params.limit)?;
    let offset = params.offset.unwrap_or(0);

    let season = match season {
        Some(n) => n,
        None => match state.oracle.current_season(Utc::now()) {
            Ok(current) => current.number,
            Err(e) => {
                warn!(error = %e, "Failed to resolve current season for leaderboard read");
                return Err(ApiError::temporarily_unavailable());
            }
        },
    };

    let view = load_leaderboard(
        &state.cache,
        state.catalog.as_ref(),
        season,
        offset,
        limit,
        &state.read_freshness,
    )
    .await
    .map_err(|e| {
        warn!(season, error = %e, "Leaderboard read failed");
        ApiError::temporarily_unavailable()
    })?;

    Ok(Json(view))
}

/// POST /leaderboard/refresh - Re-aggregate a season now
#[utoipa::path(
    post,
    path = "/leaderboard/refresh",
    tag = "Leaderboard",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Snapshot replaced", body = RefreshResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Missing API key", body = ApiError),
        (status = 403, description = "Invalid API key", body = ApiError),
        (status = 409, description = "Another run holds the season", body = ApiError),
        (status = 503, description = "Vote ledger or store unreachable", body = ApiError),
        (status = 504, description = "Run timed out", body = ApiError),
    ),
    security(
        ("api_key" = [])
    )
)]
pub async fn refresh_leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    state.auth.authorize(&headers)?;

    let req: RefreshRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RefreshRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let season = match validate_season(req.season)? {
        Some(n) => n,
        None => state.oracle.current_season(Utc::now())?.number,
    };

    let report = state.reconciler.run(season, RunTrigger::Manual).await?;
    Ok(Json(RefreshResponse::from(report)))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/leaderboard", get(get_leaderboard))
        .route("/leaderboard/refresh", post(refresh_leaderboard))
}
