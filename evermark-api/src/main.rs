//! Evermark API Server Entry Point
//!
//! Bootstraps configuration, applies the schema, starts the season refresh
//! job and serves the Axum router until Ctrl-C.

use std::sync::Arc;

use evermark_api::jobs::{season_refresh_task, SeasonRefreshConfig};
use evermark_api::telemetry::{init_tracer, TelemetryConfig};
use evermark_api::{
    create_router, reconcile_config_from_env, season_config_from_env, ApiConfig, ApiError,
    ApiResult, AppState, ChainClient, ChainConfig, DbClient, DbConfig,
};
use evermark_core::SeasonOracle;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    api_config.validate_for_production()?;

    let season_config = season_config_from_env(api_config.is_production())?;
    let oracle = Arc::new(SeasonOracle::new(season_config)?);
    let reconcile_config = reconcile_config_from_env()?;

    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.migrate().await?;

    let mut state = AppState::new(Arc::new(db), oracle.clone(), reconcile_config, &api_config)?;
    if let Some(chain_config) = ChainConfig::from_env() {
        tracing::info!(rpc_url = %chain_config.rpc_url, "Season contract cross-check enabled");
        state = state.with_chain(Arc::new(ChainClient::new(chain_config)?));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let job = tokio::spawn(season_refresh_task(
        state.reconciler.clone(),
        oracle,
        SeasonRefreshConfig::from_env(),
        shutdown_rx,
    ));

    let app = create_router(state, &api_config);

    let addr = api_config.socket_addr();
    tracing::info!(%addr, environment = %api_config.environment, "Starting Evermark API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = job.await {
        tracing::warn!(error = %e, "Season refresh task did not stop cleanly");
    }

    Ok(())
}
