//! Evermark Test Utilities
//!
//! Shared test infrastructure for the Evermark workspace:
//! - Proptest generators for addresses, amounts and votes
//! - Fixtures for seeded in-memory stores
//! - Assertions over leaderboard invariants

pub use evermark_core::{
    Address, EvermarkError, EvermarkResult, Item, ItemId, LeaderboardEntry, SeasonConfig,
    SeasonNumber, Timestamp, TokenAmount, VoteRecord,
};
pub use evermark_storage::InMemoryStore;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Evermark ledger types.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// A lowercase `0x` EVM address.
    pub fn arb_address() -> impl Strategy<Value = Address> {
        any::<[u8; 20]>().prop_map(|bytes| {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            fixtures::address(&format!("0x{}", hex))
        })
    }

    /// One of `count` fixed voters, so generated ledgers repeat voters.
    pub fn arb_voter(count: u8) -> impl Strategy<Value = Address> {
        (0..count.max(1)).prop_map(fixtures::voter)
    }

    /// Amounts from zero up to well past `u64::MAX` base units.
    pub fn arb_amount() -> impl Strategy<Value = TokenAmount> {
        prop_oneof![
            Just(TokenAmount::zero()),
            (1u64..1_000_000).prop_map(TokenAmount::from),
            any::<u128>().prop_map(TokenAmount::from_wei),
        ]
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_600_000_000i64..1_900_000_000).prop_map(|secs| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or_else(Utc::now)
        })
    }

    /// Votes of one season against items `1..=items`, with ascending ids.
    pub fn arb_votes(
        season: SeasonNumber,
        items: ItemId,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<VoteRecord>> {
        prop::collection::vec(
            (arb_voter(8), 1..=items.max(1), arb_amount(), arb_timestamp()),
            0..max_len,
        )
        .prop_map(move |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (voter_id, item_id, amount, cast_at))| VoteRecord {
                    vote_id: i as i64 + 1,
                    voter_id,
                    item_id,
                    season,
                    amount,
                    cast_at,
                })
                .collect()
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made ledgers and catalogs.

    use super::*;

    /// Parse a fixture address. Panics on an empty string.
    pub fn address(raw: &str) -> Address {
        Address::parse(raw).unwrap_or_else(|e| panic!("bad fixture address {:?}: {}", raw, e))
    }

    /// The `n`th deterministic voter address.
    pub fn voter(n: u8) -> Address {
        address(&format!("0x{:040x}", 0xa000u32 + u32::from(n)))
    }

    /// The owner of item `item_id` in [`item`].
    pub fn owner(item_id: ItemId) -> Address {
        address(&format!("0x{:040x}", 0xb000i64 + item_id))
    }

    pub fn item(item_id: ItemId) -> Item {
        Item {
            item_id,
            owner_id: owner(item_id),
            title: format!("Evermark #{}", item_id),
            metadata: serde_json::json!({ "contentType": "article" }),
        }
    }

    /// A store with items `1..=items` and no votes.
    pub fn store_with_items(items: ItemId) -> InMemoryStore {
        let store = InMemoryStore::new();
        for item_id in 1..=items {
            store
                .upsert_item(item(item_id))
                .unwrap_or_else(|e| panic!("seed item {}: {}", item_id, e));
        }
        store
    }

    /// Record `(voter, item, base units)` votes for `season`.
    pub fn cast(store: &InMemoryStore, season: SeasonNumber, votes: &[(Address, ItemId, u64)]) {
        for (voter_id, item_id, tokens) in votes {
            store
                .record_vote(voter_id.clone(), *item_id, season, TokenAmount::from(*tokens))
                .unwrap_or_else(|e| panic!("seed vote: {}", e));
        }
    }

    /// Items A=1, B=2, C=3 with totals 100, 100, 50 from distinct voters.
    pub fn tied_season(season: SeasonNumber) -> InMemoryStore {
        let store = store_with_items(3);
        cast(
            &store,
            season,
            &[
                (voter(1), 1, 60),
                (voter(2), 1, 40),
                (voter(3), 2, 100),
                (voter(4), 3, 50),
            ],
        );
        store
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Leaderboard invariant checks.

    use super::*;

    /// Equal totals share a rank; otherwise rank is the 1-based position.
    #[track_caller]
    pub fn assert_competition_ranks(entries: &[LeaderboardEntry]) {
        for (i, entry) in entries.iter().enumerate() {
            let expected = match i {
                0 => 1,
                _ if entries[i - 1].total_votes == entry.total_votes => entries[i - 1].rank,
                _ => i as u32 + 1,
            };
            assert_eq!(entry.rank, expected, "bad rank at position {}: {:?}", i, entry);
            if i > 0 {
                assert!(
                    entries[i - 1].total_votes >= entry.total_votes,
                    "entries not sorted by total at position {}",
                    i
                );
            }
        }
    }

    /// Assert that a result is a `WriteConflict`.
    #[track_caller]
    pub fn assert_write_conflict<T: std::fmt::Debug>(result: &EvermarkResult<T>) {
        match result {
            Err(EvermarkError::WriteConflict { .. }) => {}
            other => panic!("Expected WriteConflict, got: {:?}", other),
        }
    }
}
