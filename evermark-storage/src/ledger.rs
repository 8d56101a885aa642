//! Paged vote ledger reader.
//!
//! Walks the ledger for one season by stable vote-id cursor. Each page read
//! is retried with bounded exponential backoff; a page that is re-read after
//! a failure starts from the same cursor, and votes are de-duplicated by id,
//! so no vote is ever counted twice.

use std::collections::HashSet;

use evermark_core::{
    EvermarkError, EvermarkResult, RetryConfig, SeasonNumber, VoteId, VoteRecord,
};
use tracing::{debug, warn};

use crate::traits::{VoteLedger, VotePage};

/// Options for a full-season ledger read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub page_size: usize,
    pub retry: RetryConfig,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            retry: RetryConfig::default(),
        }
    }
}

/// Everything read for one season.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRead {
    pub votes: Vec<VoteRecord>,
    pub pages: usize,
    pub retries: u32,
    /// Votes seen more than once across pages and dropped.
    pub duplicates_dropped: usize,
}

/// Read every vote of `season`.
///
/// # Errors
///
/// `SourceUnavailable` when a page still fails after `retry.max_retries`
/// retries. A failed read is never reported as an empty ledger.
pub async fn read_votes(
    ledger: &dyn VoteLedger,
    season: SeasonNumber,
    options: &ReadOptions,
) -> EvermarkResult<LedgerRead> {
    if options.page_size == 0 {
        return Err(EvermarkError::invalid_configuration(
            "ledger page size must be greater than 0",
        ));
    }

    let mut read = LedgerRead::default();
    let mut seen: HashSet<VoteId> = HashSet::new();
    let mut cursor: Option<VoteId> = None;

    loop {
        let page = read_page_with_retry(ledger, season, cursor, options, &mut read.retries).await?;
        read.pages += 1;

        for vote in page.votes {
            if vote.season != season {
                warn!(season, vote_id = vote.vote_id, vote_season = vote.season, "Ledger returned vote from another season");
                continue;
            }
            if seen.insert(vote.vote_id) {
                read.votes.push(vote);
            } else {
                read.duplicates_dropped += 1;
            }
        }

        match page.next_cursor {
            Some(next) if cursor.map_or(true, |c| next > c) => cursor = Some(next),
            Some(next) => {
                return Err(EvermarkError::source_unavailable(
                    "vote ledger",
                    format!("cursor did not advance past {} (got {})", cursor.unwrap_or_default(), next),
                ));
            }
            None => break,
        }
    }

    debug!(
        season,
        votes = read.votes.len(),
        pages = read.pages,
        retries = read.retries,
        "Ledger read complete"
    );
    Ok(read)
}

async fn read_page_with_retry(
    ledger: &dyn VoteLedger,
    season: SeasonNumber,
    cursor: Option<VoteId>,
    options: &ReadOptions,
    retries: &mut u32,
) -> EvermarkResult<VotePage> {
    let mut attempt: u32 = 0;
    loop {
        match ledger.read_page(season, cursor, options.page_size).await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_retryable() && attempt < options.retry.max_retries => {
                attempt += 1;
                *retries += 1;
                let delay = options.retry.backoff_for(attempt);
                warn!(
                    season,
                    cursor = ?cursor,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Ledger page read failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e @ EvermarkError::SourceUnavailable { .. }) => return Err(e),
            Err(EvermarkError::Storage(e)) => {
                return Err(EvermarkError::source_unavailable("vote ledger", e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use evermark_core::{Address, TokenAmount};
    use proptest::prelude::*;
    use std::time::Duration;

    fn options(page_size: usize, max_retries: u32) -> ReadOptions {
        ReadOptions {
            page_size,
            retry: RetryConfig {
                max_retries,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
                backoff_multiplier: 2.0,
            },
        }
    }

    fn seed(store: &InMemoryStore, season: SeasonNumber, count: usize) {
        let voter = Address::parse("0xvoter").unwrap();
        for i in 0..count {
            store
                .record_vote(voter.clone(), (i % 5) as i64 + 1, season, TokenAmount::from(10u64))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_reads_all_pages() {
        let store = InMemoryStore::new();
        seed(&store, 1, 23);
        seed(&store, 2, 4);

        let read = read_votes(&store, 1, &options(10, 0)).await.unwrap();

        assert_eq!(read.votes.len(), 23);
        assert_eq!(read.pages, 3);
        assert!(read.votes.windows(2).all(|w| w[0].vote_id < w[1].vote_id));
        assert!(read.votes.iter().all(|v| v.season == 1));
    }

    #[tokio::test]
    async fn test_retries_transient_failures_without_double_counting() {
        let store = InMemoryStore::new();
        seed(&store, 1, 25);
        store.fail_ledger_reads(2);

        let read = read_votes(&store, 1, &options(10, 3)).await.unwrap();

        assert_eq!(read.votes.len(), 25);
        assert_eq!(read.retries, 2);
        let unique: HashSet<_> = read.votes.iter().map(|v| v.vote_id).collect();
        assert_eq!(unique.len(), 25);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_source_unavailable() {
        let store = InMemoryStore::new();
        seed(&store, 1, 5);
        store.fail_ledger_reads(10);

        let err = read_votes(&store, 1, &options(10, 2)).await.unwrap_err();

        assert!(matches!(err, EvermarkError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_empty_season_is_not_an_error() {
        let store = InMemoryStore::new();
        let read = read_votes(&store, 9, &options(10, 0)).await.unwrap();
        assert!(read.votes.is_empty());
        assert_eq!(read.pages, 1);
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() {
        let store = InMemoryStore::new();
        assert!(matches!(
            read_votes(&store, 1, &options(0, 0)).await,
            Err(EvermarkError::InvalidConfiguration { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Any page size and any recoverable outage yields exactly the
        /// season's votes, once each, in vote-id order.
        #[test]
        fn prop_read_is_complete_and_ordered(
            seasons in prop::collection::vec(1u32..=3, 0..60),
            page_size in 1usize..15,
            failures in 0u32..3,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let store = InMemoryStore::new();
            let voter = Address::parse("0xvoter").unwrap();
            let mut expected = Vec::new();
            for (i, season) in seasons.iter().enumerate() {
                let id = store
                    .record_vote(voter.clone(), i as i64 + 1, *season, TokenAmount::from(1u64))
                    .unwrap();
                if *season == 2 {
                    expected.push(id);
                }
            }
            store.fail_ledger_reads(failures);

            let read = rt.block_on(read_votes(&store, 2, &options(page_size, 3))).unwrap();
            let ids: Vec<VoteId> = read.votes.iter().map(|v| v.vote_id).collect();

            prop_assert_eq!(ids, expected);
            prop_assert_eq!(read.retries, failures);
            prop_assert_eq!(read.duplicates_dropped, 0);
        }
    }
}
