//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use evermark_core::{EvermarkResult, ReconcileConfig, SeasonOracle};
use evermark_storage::{
    Freshness, ItemCatalog, LeaderboardStore, LeaseStore, SnapshotCache, VoteLedger,
};

use crate::auth::AdminAuth;
use crate::chain::SeasonReporter;
use crate::config::ApiConfig;
use crate::constants::DEFAULT_CACHE_MAX_PAGES;
use crate::routes::health::HealthCheck;
use crate::services::LeaderboardReconciler;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub oracle: Arc<SeasonOracle>,
    pub reconciler: Arc<LeaderboardReconciler>,
    /// Read cache over snapshot pages; invalidated by the reconciler.
    pub cache: Arc<SnapshotCache>,
    pub catalog: Arc<dyn ItemCatalog>,
    pub health: Arc<dyn HealthCheck>,
    /// Season contract client, when configured.
    pub chain: Option<Arc<dyn SeasonReporter>>,
    pub auth: AdminAuth,
    pub read_freshness: Freshness,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the state over one storage backend.
    pub fn new<B>(
        backend: Arc<B>,
        oracle: Arc<SeasonOracle>,
        reconcile: ReconcileConfig,
        api: &ApiConfig,
    ) -> EvermarkResult<Self>
    where
        B: VoteLedger + ItemCatalog + LeaderboardStore + LeaseStore + HealthCheck + 'static,
    {
        let cache = Arc::new(SnapshotCache::new(backend.clone(), DEFAULT_CACHE_MAX_PAGES));
        let reconciler = LeaderboardReconciler::from_backend(backend.clone(), reconcile)?
            .with_cache(cache.clone());

        let read_freshness = if api.cache_max_staleness.is_zero() {
            Freshness::consistent()
        } else {
            Freshness::best_effort(api.cache_max_staleness)
        };

        Ok(Self {
            oracle,
            reconciler: Arc::new(reconciler),
            cache,
            catalog: backend.clone(),
            health: backend,
            chain: None,
            auth: AdminAuth::from_keys(&api.admin_api_keys),
            read_freshness,
            start_time: Instant::now(),
        })
    }

    pub fn with_chain(mut self, chain: Arc<dyn SeasonReporter>) -> Self {
        self.chain = Some(chain);
        self
    }
}
