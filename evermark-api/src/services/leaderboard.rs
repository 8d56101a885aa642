//! Leaderboard read model.
//!
//! Joins a snapshot page with item titles and metadata. A season without a
//! snapshot is `pending`; a computed season may have zero entries. Items
//! deleted after the run stay listed with null title and metadata.

use evermark_core::{EvermarkResult, ItemId, SeasonNumber, Timestamp, TokenAmount};
use evermark_storage::{Freshness, ItemCatalog, SnapshotCache};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    /// No run has committed for the season yet.
    Pending,
    Computed,
}

/// One ranked item with display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub item_id: ItemId,
    pub total_votes: TokenAmount,
    pub rank: u32,
    pub title: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
}

/// Response body of `GET /leaderboard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardView {
    pub entries: Vec<LeaderboardRow>,
    pub season: SeasonNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub computed_at: Option<Timestamp>,
    pub status: SnapshotStatus,
    pub offset: usize,
    pub limit: usize,
    pub total_entries: usize,
}

impl LeaderboardView {
    pub fn pending(season: SeasonNumber, offset: usize, limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            season,
            computed_at: None,
            status: SnapshotStatus::Pending,
            offset,
            limit,
            total_entries: 0,
        }
    }
}

/// Load one page of a season's leaderboard.
pub async fn load_leaderboard(
    cache: &SnapshotCache,
    catalog: &dyn ItemCatalog,
    season: SeasonNumber,
    offset: usize,
    limit: usize,
    freshness: &Freshness,
) -> EvermarkResult<LeaderboardView> {
    let read = cache.snapshot_page(season, offset, limit, freshness).await?;
    let Some(page) = read.into_value() else {
        return Ok(LeaderboardView::pending(season, offset, limit));
    };

    let ids: Vec<ItemId> = page.entries.iter().map(|e| e.item_id).collect();
    let mut items = catalog.items_by_ids(&ids).await?;

    let entries = page
        .entries
        .into_iter()
        .map(|entry| {
            let item = items.remove(&entry.item_id);
            LeaderboardRow {
                item_id: entry.item_id,
                total_votes: entry.total_votes,
                rank: entry.rank,
                title: item.as_ref().map(|i| i.title.clone()),
                metadata: item.map(|i| i.metadata),
            }
        })
        .collect();

    Ok(LeaderboardView {
        entries,
        season,
        computed_at: Some(page.computed_at),
        status: SnapshotStatus::Computed,
        offset,
        limit,
        total_entries: page.total_entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use evermark_core::{Address, Item, LeaderboardEntry, LeaderboardSnapshot};
    use evermark_storage::{InMemoryStore, LeaderboardStore};
    use std::sync::Arc;

    fn entry(item_id: ItemId, total: u64, rank: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            item_id,
            season: 4,
            total_votes: TokenAmount::from(total),
            rank,
        }
    }

    #[tokio::test]
    async fn test_pending_vs_computed_empty() {
        let store = InMemoryStore::new();
        let cache = SnapshotCache::new(Arc::new(store.clone()), 8);

        let view = load_leaderboard(&cache, &store, 4, 0, 50, &Freshness::consistent()).await.unwrap();
        assert_eq!(view.status, SnapshotStatus::Pending);
        assert!(view.computed_at.is_none());

        store
            .replace_snapshot(&LeaderboardSnapshot {
                season: 4,
                run_id: evermark_core::new_run_id(),
                computed_at: Utc::now(),
                entries: vec![],
            })
            .await
            .unwrap();

        let view = load_leaderboard(&cache, &store, 4, 0, 50, &Freshness::consistent()).await.unwrap();
        assert_eq!(view.status, SnapshotStatus::Computed);
        assert!(view.entries.is_empty());
        assert!(view.computed_at.is_some());
    }

    #[tokio::test]
    async fn test_deleted_item_listed_with_null_fields() {
        let store = InMemoryStore::new();
        store
            .upsert_item(Item {
                item_id: 1,
                owner_id: Address::parse("0xowner").unwrap(),
                title: "Kept".to_string(),
                metadata: serde_json::json!({"kind": "cast"}),
            })
            .unwrap();
        store
            .replace_snapshot(&LeaderboardSnapshot {
                season: 4,
                run_id: evermark_core::new_run_id(),
                computed_at: Utc::now(),
                entries: vec![entry(1, 50, 1), entry(2, 20, 2)],
            })
            .await
            .unwrap();
        let cache = SnapshotCache::new(Arc::new(store.clone()), 8);

        let view = load_leaderboard(&cache, &store, 4, 0, 50, &Freshness::consistent()).await.unwrap();

        assert_eq!(view.total_entries, 2);
        assert_eq!(view.entries[0].title.as_deref(), Some("Kept"));
        assert_eq!(view.entries[1].item_id, 2);
        assert!(view.entries[1].title.is_none());
        assert!(view.entries[1].metadata.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&LeaderboardView::pending(3, 0, 50)).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"totalEntries\":0"));
        assert!(json.contains("\"computedAt\":null"));
    }
}
