//! Read-through cache over [`LeaderboardStore::snapshot_page`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use evermark_core::{EvermarkResult, SeasonNumber};
use tokio::sync::RwLock;

use super::freshness::{CacheRead, Freshness};
use crate::traits::{LeaderboardStore, SnapshotPage};

type PageKey = (SeasonNumber, usize, usize);

#[derive(Debug, Clone)]
struct CachedPage {
    page: Option<SnapshotPage>,
    cached_at: DateTime<Utc>,
}

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub invalidations: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.invalidations.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Default)]
struct CacheState {
    pages: HashMap<PageKey, CachedPage>,
    /// Bumped by every invalidation of a season.
    generations: HashMap<SeasonNumber, u64>,
    /// Bumped by `clear`.
    epoch: u64,
}

impl CacheState {
    fn generation(&self, season: SeasonNumber) -> (u64, u64) {
        (self.epoch, self.generations.get(&season).copied().unwrap_or(0))
    }
}

/// Caches snapshot pages per `(season, offset, limit)`.
///
/// "Pending" (no snapshot yet) is cached like any other answer, so the
/// committing side must call [`invalidate`](Self::invalidate). A page fetched
/// before an invalidation of its season is returned but never cached.
pub struct SnapshotCache {
    store: Arc<dyn LeaderboardStore>,
    state: RwLock<CacheState>,
    max_pages: usize,
    stats: CacheStats,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn LeaderboardStore>, max_pages: usize) -> Self {
        Self {
            store,
            state: RwLock::new(CacheState::default()),
            max_pages: max_pages.max(1),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub async fn snapshot_page(
        &self,
        season: SeasonNumber,
        offset: usize,
        limit: usize,
        freshness: &Freshness,
    ) -> EvermarkResult<CacheRead<Option<SnapshotPage>>> {
        let key = (season, offset, limit);

        let generation = {
            let state = self.state.read().await;
            if let Freshness::BestEffort { max_staleness } = freshness {
                if let Some(cached) = state.pages.get(&key) {
                    let age = (Utc::now() - cached.cached_at)
                        .to_std()
                        .unwrap_or_default();
                    if age <= *max_staleness {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(CacheRead::from_cache(cached.page.clone(), cached.cached_at));
                    }
                }
            }
            state.generation(season)
        };

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let page = self.store.snapshot_page(season, offset, limit).await?;
        let read = CacheRead::from_storage(page);

        let mut state = self.state.write().await;
        if state.generation(season) != generation {
            return Ok(read);
        }
        if state.pages.len() >= self.max_pages && !state.pages.contains_key(&key) {
            // Coarse eviction: pages are cheap to refetch.
            state.pages.clear();
        }
        state.pages.insert(
            key,
            CachedPage {
                page: read.value().clone(),
                cached_at: read.cached_at(),
            },
        );
        Ok(read)
    }

    /// Drop every cached page of `season`.
    pub async fn invalidate(&self, season: SeasonNumber) {
        let mut state = self.state.write().await;
        state.pages.retain(|(s, _, _), _| *s != season);
        *state.generations.entry(season).or_insert(0) += 1;
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.pages.clear();
        state.epoch += 1;
    }
}
