//! HTTP Router Tests
//!
//! Drives the full Axum router over an in-memory store with
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use evermark_api::{create_router, ApiConfig, AppState};
use evermark_core::{LeaseData, ReconcileConfig, RetryConfig, SeasonConfig, SeasonOracle};
use evermark_storage::InMemoryStore;
use evermark_test_utils::fixtures::{cast, tied_season, voter};
use serde_json::Value;
use tower::ServiceExt;

const ADMIN_KEY: &str = "evermark-admin-test-key";

fn api_config() -> ApiConfig {
    ApiConfig {
        admin_api_keys: vec![ADMIN_KEY.to_string()],
        cache_max_staleness: Duration::ZERO,
        ..ApiConfig::default()
    }
}

/// Router over `store` whose current season is 3.
fn app(store: &InMemoryStore) -> Router {
    let epoch = Utc::now() - chrono::Duration::days(15);
    let oracle = Arc::new(SeasonOracle::new(SeasonConfig::weekly(epoch)).unwrap());
    let reconcile = ReconcileConfig {
        retry: RetryConfig::none(),
        run_attempts: 1,
        ..ReconcileConfig::default()
    };
    let config = api_config();
    let state = AppState::new(Arc::new(store.clone()), oracle, reconcile, &config).unwrap();
    create_router(state, &config)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn refresh(key: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/leaderboard/refresh")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// ============================================================================
// READ PATH
// ============================================================================

#[tokio::test]
async fn test_pending_then_computed() {
    let store = tied_season(3);
    let app = app(&store);

    let (status, body) = send(app.clone(), get("/leaderboard?season=3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["entries"].as_array().unwrap().len(), 0);
    assert!(body["computedAt"].is_null());

    let (status, _) = send(app.clone(), refresh(Some(ADMIN_KEY), r#"{"season":3}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, get("/leaderboard?season=3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "computed");
    assert_eq!(body["totalEntries"], 3);
    assert_eq!(body["entries"][0]["itemId"], 1);
    assert_eq!(body["entries"][0]["rank"], 1);
    assert_eq!(body["entries"][0]["title"], "Evermark #1");
    assert_eq!(body["entries"][2]["rank"], 3);
    assert!(body["computedAt"].is_string());
}

#[tokio::test]
async fn test_computed_season_without_votes_is_empty() {
    let store = tied_season(3);
    let app = app(&store);

    let (status, _) = send(app.clone(), refresh(Some(ADMIN_KEY), r#"{"season":8}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(app, get("/leaderboard?season=8")).await;
    assert_eq!(body["status"], "computed");
    assert_eq!(body["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_default_season_is_current() {
    let store = tied_season(3);
    let app = app(&store);

    let (status, body) = send(app, get("/leaderboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["season"], 3);
    assert_eq!(body["limit"], 50);
    assert_eq!(body["offset"], 0);
}

#[tokio::test]
async fn test_paging() {
    let store = tied_season(3);
    let app = app(&store);
    send(app.clone(), refresh(Some(ADMIN_KEY), "")).await;

    let (_, body) = send(app, get("/leaderboard?season=3&offset=2&limit=5")).await;
    assert_eq!(body["totalEntries"], 3);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["itemId"], 3);
}

#[tokio::test]
async fn test_deleted_item_keeps_entry() {
    let store = tied_season(3);
    let app = app(&store);
    send(app.clone(), refresh(Some(ADMIN_KEY), "")).await;
    store.delete_item(2).unwrap();

    let (_, body) = send(app, get("/leaderboard?season=3")).await;
    let entry = &body["entries"][1];
    assert_eq!(entry["itemId"], 2);
    assert!(entry["title"].is_null());
    assert!(entry["metadata"].is_null());
}

#[tokio::test]
async fn test_invalid_bounds_rejected() {
    let store = InMemoryStore::new();
    let app = app(&store);

    let (status, body) = send(app.clone(), get("/leaderboard?limit=1001")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_RANGE");

    let (status, _) = send(app.clone(), get("/leaderboard?season=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app, get("/leaderboard?limit=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
    assert!(body["message"].as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn test_read_failure_is_temporarily_unavailable() {
    let store = tied_season(3);
    let app = app(&store);
    send(app.clone(), refresh(Some(ADMIN_KEY), "")).await;
    store.fail_catalog_reads(1);

    let (status, body) = send(app, get("/leaderboard?season=3")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "TEMPORARILY_UNAVAILABLE");
}

// ============================================================================
// REFRESH TRIGGER
// ============================================================================

#[tokio::test]
async fn test_refresh_requires_key() {
    let store = tied_season(3);
    let app = app(&store);

    let (status, body) = send(app.clone(), refresh(None, "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _) = send(app, refresh(Some("wrong-key"), "")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(store.snapshot(3).is_none());
}

#[tokio::test]
async fn test_refresh_reports_run() {
    let store = tied_season(3);
    cast(&store, 3, &[(voter(7), 42, 9)]);
    let app = app(&store);

    let (status, body) = send(app, refresh(Some(ADMIN_KEY), "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["season"], 3);
    assert_eq!(body["entriesWritten"], 3);
    assert_eq!(body["danglingReferences"], 1);
    assert_eq!(body["selfVotesExcluded"], 0);
    assert_eq!(body["votesRead"], 5);
    assert_eq!(body["topEntries"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_refresh_conflict() {
    let store = tied_season(3);
    store
        .plant_lease(LeaseData::new(3, "other-runner", Utc::now(), Duration::from_secs(600)))
        .unwrap();
    let app = app(&store);

    let (status, body) = send(app, refresh(Some(ADMIN_KEY), r#"{"season":3}"#)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "WRITE_CONFLICT");
}

#[tokio::test]
async fn test_refresh_rejects_bad_body() {
    let store = tied_season(3);
    let app = app(&store);

    let (status, _) = send(app.clone(), refresh(Some(ADMIN_KEY), "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app, refresh(Some(ADMIN_KEY), r#"{"season":0}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// SEASONS, HEALTH, METRICS
// ============================================================================

#[tokio::test]
async fn test_current_season() {
    let store = InMemoryStore::new();
    let (status, body) = send(app(&store), get("/seasons/current")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["number"], 3);
    assert!(body["start"].is_string());
    assert!(body.get("chain").is_none());
}

#[tokio::test]
async fn test_readiness() {
    let store = InMemoryStore::new();
    let (status, body) = send(app(&store), get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["details"]["database"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_exposed() {
    let store = InMemoryStore::new();
    let response = app(&store).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
