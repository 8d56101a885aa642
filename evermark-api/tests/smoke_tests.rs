//! End-to-end smoke tests against PostgreSQL.
//!
//! Run with `--features db-tests` and the `EVERMARK_DB_*` variables pointing
//! at a scratch database.

#![cfg(feature = "db-tests")]

use std::sync::Arc;

use chrono::Utc;
use evermark_api::{ApiResult, DbClient, DbConfig, LeaderboardReconciler, RunTrigger};
use evermark_core::{ReconcileConfig, TokenAmount};
use evermark_storage::LeaderboardStore;
use evermark_test_utils::fixtures::{item, owner, voter};

async fn test_db() -> ApiResult<DbClient> {
    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.migrate().await?;
    Ok(db)
}

/// A season number unlikely to collide with earlier runs.
fn scratch_season() -> u32 {
    1_000_000 + (Utc::now().timestamp_millis() % 1_000_000) as u32
}

#[tokio::test]
async fn smoke_test_reconcile_round_trip() -> ApiResult<()> {
    let db = test_db().await?;
    let season = scratch_season();
    let base = i64::from(season) * 10;

    for item_id in [base + 1, base + 2] {
        db.upsert_item(&item(item_id)).await?;
    }
    let now = Utc::now();
    db.insert_vote(&voter(1), base + 1, season, &TokenAmount::from(100u64), now).await?;
    db.insert_vote(&voter(2), base + 2, season, &TokenAmount::from(100u64), now).await?;
    db.insert_vote(&owner(base + 1), base + 1, season, &TokenAmount::from(1000u64), now).await?;
    db.insert_vote(&voter(3), base + 9, season, &TokenAmount::from(5u64), now).await?;

    let db = Arc::new(db);
    let reconciler = LeaderboardReconciler::from_backend(db.clone(), ReconcileConfig::default())?;

    let first = reconciler.run(season, RunTrigger::Cli).await?;
    assert_eq!(first.entries_written, 2);
    assert_eq!(first.self_votes_excluded, 1);
    assert_eq!(first.dangling_references, 1);
    assert!(first.top_entries.iter().all(|e| e.rank == 1));

    let second = reconciler.run(season, RunTrigger::Cli).await?;
    assert_eq!(first.digest, second.digest);

    let page = db.snapshot_page(season, 0, 10).await?.expect("snapshot committed");
    assert_eq!(page.run_id, second.run_id);
    assert_eq!(page.total_entries, 2);
    Ok(())
}
