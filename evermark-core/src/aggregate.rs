//! Vote aggregation and ranking.
//!
//! Totals are summed exactly with [`TokenAmount`]. Ranking sorts by total
//! descending (item id ascending among equals) and gives tied totals the
//! same rank; the next distinct total is ranked by its 1-based position, so
//! `{A: 100, B: 100, C: 50}` ranks as `{A: 1, B: 1, C: 3}`.

use crate::{
    ItemId, LeaderboardEntry, LeaderboardSnapshot, RunId, SeasonNumber, Timestamp, TokenAmount,
    VoteRecord,
};
use std::collections::BTreeMap;

/// Unranked per-item total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTally {
    pub item_id: ItemId,
    pub total_votes: TokenAmount,
}

/// Sum vote amounts per item for `season`.
///
/// Votes recorded under another season are skipped. Items whose total is
/// zero are not returned. Output is ordered by item id.
pub fn aggregate(season: SeasonNumber, votes: &[VoteRecord]) -> Vec<ItemTally> {
    let mut totals: BTreeMap<ItemId, TokenAmount> = BTreeMap::new();
    for vote in votes.iter().filter(|v| v.season == season) {
        *totals.entry(vote.item_id).or_default() += &vote.amount;
    }

    totals
        .into_iter()
        .filter(|(_, total)| !total.is_zero())
        .map(|(item_id, total_votes)| ItemTally {
            item_id,
            total_votes,
        })
        .collect()
}

/// Order tallies and assign ranks.
pub fn rank(season: SeasonNumber, mut tallies: Vec<ItemTally>) -> Vec<LeaderboardEntry> {
    tallies.sort_by(|a, b| {
        b.total_votes
            .cmp(&a.total_votes)
            .then(a.item_id.cmp(&b.item_id))
    });

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(tallies.len());
    for (index, tally) in tallies.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.total_votes == tally.total_votes => prev.rank,
            _ => index as u32 + 1,
        };
        entries.push(LeaderboardEntry {
            item_id: tally.item_id,
            season,
            total_votes: tally.total_votes,
            rank,
        });
    }
    entries
}

/// Aggregate and rank already-filtered votes into a full snapshot.
pub fn build_snapshot(
    season: SeasonNumber,
    votes: &[VoteRecord],
    run_id: RunId,
    computed_at: Timestamp,
) -> LeaderboardSnapshot {
    LeaderboardSnapshot {
        season,
        run_id,
        computed_at,
        entries: rank(season, aggregate(season, votes)),
    }
}
