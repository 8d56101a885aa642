//! Ledger records and leaderboard entities

use crate::{Address, ItemId, RunId, SeasonNumber, Timestamp, TokenAmount, VoteId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One vote as recorded in the ledger. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    /// Stable ledger cursor; strictly increasing in insertion order.
    pub vote_id: VoteId,
    pub voter_id: Address,
    pub item_id: ItemId,
    pub season: SeasonNumber,
    pub amount: TokenAmount,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub cast_at: Timestamp,
}

/// A curated content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: ItemId,
    pub owner_id: Address,
    pub title: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: serde_json::Value,
}

/// A ranked item within one season's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub item_id: ItemId,
    pub season: SeasonNumber,
    pub total_votes: TokenAmount,
    pub rank: u32,
}

/// The complete output of one aggregation run for one season.
///
/// Entries are ordered by rank, then by item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub season: SeasonNumber,
    pub run_id: RunId,
    pub computed_at: Timestamp,
    pub entries: Vec<LeaderboardEntry>,
}

impl LeaderboardSnapshot {
    /// Sum of all entry totals.
    pub fn total_votes(&self) -> TokenAmount {
        self.entries.iter().map(|e| &e.total_votes).sum()
    }

    pub fn top(&self, n: usize) -> &[LeaderboardEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content digest over `(item_id, total, rank)` of every entry.
    ///
    /// Independent of run id and timestamp, so two runs over the same votes
    /// produce the same digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.season.to_be_bytes());
        for entry in &self.entries {
            hasher.update(entry.item_id.to_be_bytes());
            hasher.update(entry.total_votes.to_string().as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.rank.to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(item_id: ItemId, total: u64, rank: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            item_id,
            season: 3,
            total_votes: TokenAmount::from(total),
            rank,
        }
    }

    fn snapshot(entries: Vec<LeaderboardEntry>) -> LeaderboardSnapshot {
        LeaderboardSnapshot {
            season: 3,
            run_id: crate::new_run_id(),
            computed_at: Utc::now(),
            entries,
        }
    }

    #[test]
    fn test_digest_ignores_run_identity() {
        let a = snapshot(vec![entry(1, 100, 1), entry(2, 50, 2)]);
        let b = snapshot(vec![entry(1, 100, 1), entry(2, 50, 2)]);
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_detects_rank_change() {
        let a = snapshot(vec![entry(1, 100, 1), entry(2, 100, 1)]);
        let b = snapshot(vec![entry(1, 100, 1), entry(2, 100, 2)]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_top_and_total() {
        let snap = snapshot(vec![entry(1, 100, 1), entry(2, 100, 1), entry(3, 50, 3)]);
        assert_eq!(snap.top(2).len(), 2);
        assert_eq!(snap.top(10).len(), 3);
        assert_eq!(snap.total_votes(), TokenAmount::from(250u64));
    }

    #[test]
    fn test_vote_record_json_shape() {
        let vote = VoteRecord {
            vote_id: 9,
            voter_id: Address::parse("0xAA").unwrap(),
            item_id: 4,
            season: 2,
            amount: TokenAmount::from(15u64),
            cast_at: Utc::now(),
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["voterId"], "0xaa");
        assert_eq!(json["amount"], "15");
        assert_eq!(json["itemId"], 4);
    }
}
