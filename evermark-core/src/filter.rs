//! Self-vote filter.
//!
//! Runs before aggregation. A vote is dropped when its voter owns the item,
//! or when the item no longer exists (reported as a dangling reference, the
//! run continues).

use crate::{Address, EvermarkError, Item, ItemId, VoteId, VoteRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A vote that references an item missing from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DanglingReference {
    pub vote_id: VoteId,
    pub item_id: ItemId,
    pub voter_id: Address,
}

impl From<DanglingReference> for EvermarkError {
    fn from(dangling: DanglingReference) -> Self {
        EvermarkError::DanglingReference {
            vote_id: dangling.vote_id,
            item_id: dangling.item_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: Vec<VoteRecord>,
    pub self_votes_excluded: usize,
    pub dangling: Vec<DanglingReference>,
}

/// Split `votes` into countable votes, self-votes and dangling references.
pub fn filter_votes(votes: Vec<VoteRecord>, items: &HashMap<ItemId, Item>) -> FilterOutcome {
    let mut outcome = FilterOutcome {
        kept: Vec::with_capacity(votes.len()),
        ..Default::default()
    };

    for vote in votes {
        match items.get(&vote.item_id) {
            None => outcome.dangling.push(DanglingReference {
                vote_id: vote.vote_id,
                item_id: vote.item_id,
                voter_id: vote.voter_id,
            }),
            // Address equality is case-insensitive by construction.
            Some(item) if item.owner_id == vote.voter_id => outcome.self_votes_excluded += 1,
            Some(_) => outcome.kept.push(vote),
        }
    }

    outcome
}
