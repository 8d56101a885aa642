//! REST API Routes
//!
//! - `/leaderboard`, `/leaderboard/refresh`
//! - `/seasons/current`
//! - `/health/*` (public)
//! - `/metrics` and `/openapi.json` (public)

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ApiConfig;
use crate::constants::API_KEY_HEADER;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub mod health;
pub mod leaderboard;
pub mod season;

pub use health::HealthCheck;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS
// ============================================================================

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        // Development mode: allow all origins
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(
            "CORS: allowing origins: {:?}",
            config.cors_origins
        );
        let allowed = config.clone();
        let cors = cors.allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts| {
                origin
                    .to_str()
                    .map(|o| allowed.is_origin_allowed(o))
                    .unwrap_or(false)
            },
        ));
        if config.cors_allow_credentials {
            cors.allow_credentials(true)
        } else {
            cors
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete HTTP router over `state`.
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .nest("/health", health::create_router())
        .merge(leaderboard::create_router())
        .merge(season::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", get(openapi_json));

    router
        .layer(from_fn(observability_middleware))
        .layer(build_cors_layer(config))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_both_modes() {
        let dev = ApiConfig::default();
        let _ = build_cors_layer(&dev);

        let prod = ApiConfig {
            cors_origins: vec!["https://evermark.example".to_string()],
            cors_allow_credentials: true,
            ..ApiConfig::default()
        };
        let _ = build_cors_layer(&prod);
    }
}
