//! Error types for Evermark leaderboard operations

use crate::{ItemId, SeasonNumber, VoteId};
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Snapshot write failed for season {season}: {reason}")]
    WriteFailed { season: SeasonNumber, reason: String },

    #[error("Read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for the reconciliation job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvermarkError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Source unavailable ({source_name}): {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("Dangling reference: vote {vote_id} references missing item {item_id}")]
    DanglingReference { vote_id: VoteId, item_id: ItemId },

    #[error("Write conflict: aggregation for season {season} is held by {holder}")]
    WriteConflict { season: SeasonNumber, holder: String },

    #[error("Operation '{operation}' timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl EvermarkError {
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn source_unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether re-running the whole attempt can succeed.
    ///
    /// Unavailable sources and failed writes are transient. Configuration
    /// errors, conflicts and timeouts are surfaced to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::Storage(_))
    }
}

/// Result type alias for Evermark operations.
pub type EvermarkResult<T> = Result<T, EvermarkError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_display() {
        let err = EvermarkError::source_unavailable("postgres", "connection refused");
        let msg = format!("{}", err);
        assert!(msg.contains("Source unavailable"));
        assert!(msg.contains("postgres"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_write_conflict_display() {
        let err = EvermarkError::WriteConflict {
            season: 7,
            holder: "job@host-1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("season 7"));
        assert!(msg.contains("job@host-1"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EvermarkError::source_unavailable("ledger", "down").is_retryable());
        assert!(EvermarkError::from(StorageError::WriteFailed {
            season: 1,
            reason: "crash".to_string(),
        })
        .is_retryable());

        assert!(!EvermarkError::invalid_configuration("epoch").is_retryable());
        assert!(!EvermarkError::WriteConflict {
            season: 1,
            holder: "x".to_string(),
        }
        .is_retryable());
        assert!(!EvermarkError::Timeout {
            operation: "reconcile".to_string(),
            elapsed_ms: 10,
        }
        .is_retryable());
    }

    #[test]
    fn test_from_variants() {
        let storage = EvermarkError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, EvermarkError::Storage(_)));

        let validation = EvermarkError::from(ValidationError::RequiredFieldMissing {
            field: "season".to_string(),
        });
        assert!(matches!(validation, EvermarkError::Validation(_)));
    }
}
