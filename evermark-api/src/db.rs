//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the PostgreSQL
//! implementation of the storage traits.
//!
//! Token amounts are `NUMERIC(78,0)` columns and cross the driver boundary
//! as decimal text (`::text` on the way out, `$n::text::numeric` on the way
//! in), so no precision is lost to floats.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ::async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use evermark_core::{
    Address, EvermarkError, EvermarkResult, Held, Item, ItemId, LeaderboardEntry,
    LeaderboardSnapshot, Lease, LeaseData, LeaseStateError, SeasonNumber, StorageError,
    StoredLease, Timestamp, TokenAmount, ValidationError, VoteId, VoteRecord,
};
use evermark_storage::{ItemCatalog, LeaderboardStore, LeaseStore, SnapshotPage, VoteLedger, VotePage};
use serde_json::Value as JsonValue;
use tokio_postgres::{IsolationLevel, NoTls, Row};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics;

/// Schema applied by [`DbClient::migrate`].
const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "evermark".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("EVERMARK_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("EVERMARK_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("EVERMARK_DB_NAME").unwrap_or_else(|_| "evermark".to_string()),
            user: std::env::var("EVERMARK_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("EVERMARK_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("EVERMARK_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("EVERMARK_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(self.max_size);
        pool_config.timeouts.wait = Some(self.timeout);
        pool_config.timeouts.create = Some(self.timeout);
        pool_config.timeouts.recycle = Some(self.timeout);
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_err(err: deadpool_postgres::PoolError) -> EvermarkError {
    EvermarkError::source_unavailable("postgres", err.to_string())
}

fn read_err(err: tokio_postgres::Error) -> EvermarkError {
    if err.is_closed() {
        return EvermarkError::source_unavailable("postgres", err.to_string());
    }
    StorageError::ReadFailed {
        reason: err.to_string(),
    }
    .into()
}

fn write_err(season: SeasonNumber, err: tokio_postgres::Error) -> EvermarkError {
    StorageError::WriteFailed {
        season,
        reason: err.to_string(),
    }
    .into()
}

fn corrupt(table: &str, reason: impl std::fmt::Display) -> EvermarkError {
    StorageError::CorruptRow {
        table: table.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn season_param(season: SeasonNumber) -> EvermarkResult<i32> {
    i32::try_from(season).map_err(|_| {
        ValidationError::InvalidValue {
            field: "season".to_string(),
            reason: format!("{} does not fit the season column", season),
        }
        .into()
    })
}

fn season_from_row(table: &str, raw: i32) -> EvermarkResult<SeasonNumber> {
    SeasonNumber::try_from(raw).map_err(|_| corrupt(table, format!("negative season {}", raw)))
}

fn rank_from_row(raw: i32) -> EvermarkResult<u32> {
    u32::try_from(raw).map_err(|_| corrupt("leaderboard_entries", format!("negative rank {}", raw)))
}

fn record_db(operation: &str, entity: &str, start: Instant, success: bool) {
    if let Some(metrics) = metrics() {
        metrics.record_db_operation(operation, entity, success, start.elapsed().as_secs_f64());
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// PostgreSQL-backed vote ledger, item catalog, snapshot store and lease
/// store.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> EvermarkResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    /// Apply `sql/schema.sql`.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        tracing::info!("Database schema applied");
        Ok(())
    }

    /// Health check - verifies database connectivity.
    pub async fn health_check(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    // ========================================================================
    // LEDGER / CATALOG WRITES
    // ========================================================================

    /// Append a vote to the ledger; returns the assigned vote id.
    pub async fn insert_vote(
        &self,
        voter_id: &Address,
        item_id: ItemId,
        season: SeasonNumber,
        amount: &TokenAmount,
        cast_at: Timestamp,
    ) -> EvermarkResult<VoteId> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO votes (voter_id, item_id, season, amount, cast_at) \
                 VALUES ($1, $2, $3, $4::text::numeric, $5) RETURNING vote_id",
                &[
                    &voter_id.as_str(),
                    &item_id,
                    &season_param(season)?,
                    &amount.to_string(),
                    &cast_at,
                ],
            )
            .await
            .map_err(|e| write_err(season, e))?;
        Ok(row.get(0))
    }

    pub async fn upsert_item(&self, item: &Item) -> EvermarkResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO items (item_id, owner_id, title, metadata) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (item_id) DO UPDATE SET \
                owner_id = EXCLUDED.owner_id, title = EXCLUDED.title, metadata = EXCLUDED.metadata",
            &[&item.item_id, &item.owner_id.as_str(), &item.title, &item.metadata],
        )
        .await
        .map_err(read_err)?;
        Ok(())
    }

    // ========================================================================
    // ROW PARSING
    // ========================================================================

    fn parse_vote(row: &Row) -> EvermarkResult<VoteRecord> {
        let voter: String = row.get("voter_id");
        let amount: String = row.get("amount");
        Ok(VoteRecord {
            vote_id: row.get("vote_id"),
            voter_id: Address::parse(&voter).map_err(|e| corrupt("votes", e))?,
            item_id: row.get("item_id"),
            season: season_from_row("votes", row.get("season"))?,
            amount: TokenAmount::parse(&amount).map_err(|e| corrupt("votes", e))?,
            cast_at: row.get("cast_at"),
        })
    }

    fn parse_item(row: &Row) -> EvermarkResult<Item> {
        let owner: String = row.get("owner_id");
        let metadata: JsonValue = row.get("metadata");
        Ok(Item {
            item_id: row.get("item_id"),
            owner_id: Address::parse(&owner).map_err(|e| corrupt("items", e))?,
            title: row.get("title"),
            metadata,
        })
    }

    fn parse_entry(season: SeasonNumber, row: &Row) -> EvermarkResult<LeaderboardEntry> {
        let total: String = row.get("total_votes");
        Ok(LeaderboardEntry {
            item_id: row.get("item_id"),
            season,
            total_votes: TokenAmount::parse(&total).map_err(|e| corrupt("leaderboard_entries", e))?,
            rank: rank_from_row(row.get("rank"))?,
        })
    }

    fn parse_lease(row: &Row) -> EvermarkResult<LeaseData> {
        Ok(LeaseData {
            lease_id: row.get("lease_id"),
            season: season_from_row("aggregation_leases", row.get("season"))?,
            holder: row.get("holder"),
            acquired_at: row.get("acquired_at"),
            expires_at: row.get("expires_at"),
        })
    }
}

// ============================================================================
// STORAGE TRAITS
// ============================================================================

#[async_trait]
impl VoteLedger for DbClient {
    async fn read_page(
        &self,
        season: SeasonNumber,
        after: Option<VoteId>,
        limit: usize,
    ) -> EvermarkResult<VotePage> {
        let start = Instant::now();
        let conn = self.get_conn().await?;
        let limit_param = i64::try_from(limit).unwrap_or(i64::MAX);

        // vote_id is allocated at insert, not at commit. A vote whose
        // transaction commits after a higher id was already read is skipped
        // by this run and counted by the next one.
        let rows = conn
            .query(
                "SELECT vote_id, voter_id, item_id, season, amount::text AS amount, cast_at \
                 FROM votes WHERE season = $1 AND vote_id > $2 \
                 ORDER BY vote_id LIMIT $3",
                &[&season_param(season)?, &after.unwrap_or(0), &limit_param],
            )
            .await
            .map_err(read_err);
        record_db("read_page", "votes", start, rows.is_ok());
        let rows = rows?;

        let votes = rows.iter().map(Self::parse_vote).collect::<EvermarkResult<Vec<_>>>()?;
        let next_cursor = if votes.len() == limit {
            votes.last().map(|v| v.vote_id)
        } else {
            None
        };
        Ok(VotePage { votes, next_cursor })
    }
}

#[async_trait]
impl ItemCatalog for DbClient {
    async fn items_by_ids(&self, ids: &[ItemId]) -> EvermarkResult<HashMap<ItemId, Item>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let start = Instant::now();
        let conn = self.get_conn().await?;

        let rows = conn
            .query(
                "SELECT item_id, owner_id, title, metadata FROM items WHERE item_id = ANY($1)",
                &[&ids],
            )
            .await
            .map_err(read_err);
        record_db("items_by_ids", "items", start, rows.is_ok());

        rows?
            .iter()
            .map(|row| Self::parse_item(row).map(|item| (item.item_id, item)))
            .collect()
    }
}

#[async_trait]
impl LeaderboardStore for DbClient {
    async fn replace_snapshot(&self, snapshot: &LeaderboardSnapshot) -> EvermarkResult<()> {
        let start = Instant::now();
        let season = snapshot.season;
        let season_i32 = season_param(season)?;

        let item_ids: Vec<i64> = snapshot.entries.iter().map(|e| e.item_id).collect();
        let totals: Vec<String> = snapshot.entries.iter().map(|e| e.total_votes.to_string()).collect();
        let ranks = snapshot
            .entries
            .iter()
            .map(|e| {
                i32::try_from(e.rank).map_err(|_| {
                    EvermarkError::from(ValidationError::InvalidValue {
                        field: "rank".to_string(),
                        reason: format!("{} does not fit the rank column", e.rank),
                    })
                })
            })
            .collect::<EvermarkResult<Vec<i32>>>()?;
        let entry_count = i32::try_from(snapshot.entries.len()).unwrap_or(i32::MAX);

        let mut conn = self.get_conn().await?;
        let result: EvermarkResult<()> = async {
            let tx = conn.transaction().await.map_err(|e| write_err(season, e))?;

            tx.execute("DELETE FROM leaderboard_entries WHERE season = $1", &[&season_i32])
                .await
                .map_err(|e| write_err(season, e))?;

            tx.execute(
                "INSERT INTO leaderboard_entries (season, item_id, total_votes, rank) \
                 SELECT $1, t.item_id, t.total::numeric, t.rank \
                 FROM UNNEST($2::bigint[], $3::text[], $4::int[]) AS t(item_id, total, rank)",
                &[&season_i32, &item_ids, &totals, &ranks],
            )
            .await
            .map_err(|e| write_err(season, e))?;

            tx.execute(
                "INSERT INTO leaderboard_runs (season, run_id, computed_at, entry_count) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (season) DO UPDATE SET \
                    run_id = EXCLUDED.run_id, \
                    computed_at = EXCLUDED.computed_at, \
                    entry_count = EXCLUDED.entry_count",
                &[&season_i32, &snapshot.run_id, &snapshot.computed_at, &entry_count],
            )
            .await
            .map_err(|e| write_err(season, e))?;

            tx.commit().await.map_err(|e| {
                EvermarkError::from(StorageError::TransactionFailed {
                    reason: e.to_string(),
                })
            })
        }
        .await;

        record_db("replace_snapshot", "leaderboard_entries", start, result.is_ok());
        result
    }

    async fn snapshot_page(
        &self,
        season: SeasonNumber,
        offset: usize,
        limit: usize,
    ) -> EvermarkResult<Option<SnapshotPage>> {
        let start = Instant::now();
        let season_i32 = season_param(season)?;
        let offset_param = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit_param = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut conn = self.get_conn().await?;
        let result: EvermarkResult<Option<SnapshotPage>> = async {
            // Both reads must see the same committed snapshot.
            let tx = conn
                .build_transaction()
                .isolation_level(IsolationLevel::RepeatableRead)
                .read_only(true)
                .start()
                .await
                .map_err(read_err)?;

            let run = tx
                .query_opt(
                    "SELECT run_id, computed_at, entry_count FROM leaderboard_runs WHERE season = $1",
                    &[&season_i32],
                )
                .await
                .map_err(read_err)?;
            let Some(run) = run else {
                return Ok(None);
            };

            let rows = tx
                .query(
                    "SELECT item_id, total_votes::text AS total_votes, rank \
                     FROM leaderboard_entries WHERE season = $1 \
                     ORDER BY rank, item_id OFFSET $2 LIMIT $3",
                    &[&season_i32, &offset_param, &limit_param],
                )
                .await
                .map_err(read_err)?;
            tx.commit().await.map_err(read_err)?;

            let entry_count: i32 = run.get("entry_count");
            Ok(Some(SnapshotPage {
                season,
                run_id: run.get::<_, Uuid>("run_id"),
                computed_at: run.get("computed_at"),
                total_entries: usize::try_from(entry_count)
                    .map_err(|_| corrupt("leaderboard_runs", "negative entry count"))?,
                entries: rows
                    .iter()
                    .map(|row| Self::parse_entry(season, row))
                    .collect::<EvermarkResult<Vec<_>>>()?,
            }))
        }
        .await;

        record_db("snapshot_page", "leaderboard_entries", start, result.is_ok());
        result
    }
}

#[async_trait]
impl LeaseStore for DbClient {
    async fn try_acquire(
        &self,
        season: SeasonNumber,
        holder: &str,
        ttl: Duration,
    ) -> EvermarkResult<Lease<Held>> {
        let now = Utc::now();
        let wanted = LeaseData::new(season, holder, now, ttl);
        let season_i32 = season_param(season)?;
        let conn = self.get_conn().await?;

        // Insert, or take over an expired lease. A live lease is left alone
        // and no row comes back.
        let acquired = conn
            .query_opt(
                "INSERT INTO aggregation_leases (season, lease_id, holder, acquired_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (season) DO UPDATE SET \
                    lease_id = EXCLUDED.lease_id, \
                    holder = EXCLUDED.holder, \
                    acquired_at = EXCLUDED.acquired_at, \
                    expires_at = EXCLUDED.expires_at \
                 WHERE aggregation_leases.expires_at <= EXCLUDED.acquired_at \
                 RETURNING season, lease_id, holder, acquired_at, expires_at",
                &[
                    &season_i32,
                    &wanted.lease_id,
                    &wanted.holder,
                    &wanted.acquired_at,
                    &wanted.expires_at,
                ],
            )
            .await
            .map_err(|e| write_err(season, e))?;

        let Some(row) = acquired else {
            let current = conn
                .query_opt(
                    "SELECT holder FROM aggregation_leases WHERE season = $1",
                    &[&season_i32],
                )
                .await
                .map_err(read_err)?;
            return Err(EvermarkError::WriteConflict {
                season,
                holder: current
                    .map(|row| row.get::<_, String>("holder"))
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        };

        let stored = StoredLease {
            data: Self::parse_lease(&row)?,
        };
        if stored.data.lease_id != wanted.lease_id {
            return Err(EvermarkError::WriteConflict {
                season,
                holder: stored.data.holder,
            });
        }
        stored.into_held(holder, now).map_err(|e| match e {
            LeaseStateError::HeldByOther { season, holder } => {
                EvermarkError::WriteConflict { season, holder }
            }
            LeaseStateError::Expired { .. } => {
                EvermarkError::invalid_configuration(format!("lease ttl too short: {}", e))
            }
        })
    }

    async fn release(&self, lease: Lease<Held>) -> EvermarkResult<()> {
        let data = lease.release();
        let conn = self.get_conn().await?;
        conn.execute(
            "DELETE FROM aggregation_leases WHERE season = $1 AND lease_id = $2",
            &[&season_param(data.season)?, &data.lease_id],
        )
        .await
        .map_err(|e| write_err(data.season, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "evermark");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_season_param_bounds() {
        assert_eq!(season_param(1).unwrap(), 1);
        assert!(season_param(u32::MAX).is_err());
    }

    #[test]
    fn test_row_conversions_reject_negatives() {
        assert!(season_from_row("votes", -1).is_err());
        assert!(rank_from_row(0).is_ok());
        assert!(matches!(
            rank_from_row(-3),
            Err(EvermarkError::Storage(StorageError::CorruptRow { .. }))
        ));
    }

    #[test]
    fn test_schema_declares_all_tables() {
        for table in [
            "items",
            "votes",
            "leaderboard_entries",
            "leaderboard_runs",
            "aggregation_leases",
        ] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "missing table {}",
                table
            );
        }
    }

    #[cfg(feature = "db-tests")]
    #[tokio::test]
    async fn test_db_health_check() {
        let db = DbClient::from_config(&DbConfig::from_env()).unwrap();
        db.health_check().await.unwrap();
    }
}
