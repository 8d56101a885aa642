//! Season lease typestate.
//!
//! At most one aggregation run may hold the lease for a season. A
//! `Lease<Held>` can only be obtained from a successful acquire (or by
//! validating a stored row), and releasing consumes it.
//!
//! ```text
//! (free) ─── try_acquire() ──→ Held ─── release() ──→ (free)
//! ```
//!
//! Leases expire after their TTL so a crashed runner cannot block a season
//! forever.

use crate::{SeasonNumber, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use uuid::Uuid;

/// Lease row as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseData {
    pub lease_id: Uuid,
    pub season: SeasonNumber,
    /// Free-form runner identity, e.g. `reaggregate@host-1`.
    pub holder: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl LeaseData {
    pub fn new(season: SeasonNumber, holder: impl Into<String>, now: Timestamp, ttl: Duration) -> Self {
        Self {
            lease_id: Uuid::now_v7(),
            season,
            holder: holder.into(),
            acquired_at: now,
            expires_at: add_saturating(now, ttl),
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

fn add_saturating(at: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

pub trait LeaseState: private::Sealed + Send + Sync {}

/// The lease is currently held by this runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Held;
impl LeaseState for Held {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Held {}
}

/// A lease with compile-time state tracking.
#[derive(Debug, Clone)]
pub struct Lease<S: LeaseState> {
    data: LeaseData,
    _state: PhantomData<S>,
}

impl<S: LeaseState> Lease<S> {
    pub fn data(&self) -> &LeaseData {
        &self.data
    }

    pub fn lease_id(&self) -> Uuid {
        self.data.lease_id
    }

    pub fn season(&self) -> SeasonNumber {
        self.data.season
    }

    pub fn holder(&self) -> &str {
        &self.data.holder
    }

    pub fn expires_at(&self) -> Timestamp {
        self.data.expires_at
    }
}

impl Lease<Held> {
    /// Wrap data for a lease that was just acquired.
    pub fn new(data: LeaseData) -> Self {
        Lease {
            data,
            _state: PhantomData,
        }
    }

    /// Give up the lease, returning the row to delete.
    pub fn release(self) -> LeaseData {
        self.data
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.data.is_expired(now)
    }
}

// ============================================================================
// DATABASE BOUNDARY
// ============================================================================

/// A lease loaded from storage, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLease {
    pub data: LeaseData,
}

impl StoredLease {
    /// Treat the stored lease as held by `holder` if it is theirs and live.
    pub fn into_held(self, holder: &str, now: Timestamp) -> Result<Lease<Held>, LeaseStateError> {
        if self.data.holder != holder {
            return Err(LeaseStateError::HeldByOther {
                season: self.data.season,
                holder: self.data.holder,
            });
        }
        if self.data.is_expired(now) {
            return Err(LeaseStateError::Expired {
                season: self.data.season,
                expired_at: self.data.expires_at,
            });
        }
        Ok(Lease::new(self.data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseStateError {
    HeldByOther { season: SeasonNumber, holder: String },
    Expired { season: SeasonNumber, expired_at: Timestamp },
}

impl fmt::Display for LeaseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseStateError::HeldByOther { season, holder } => {
                write!(f, "Lease for season {} is held by {}", season, holder)
            }
            LeaseStateError::Expired { season, expired_at } => {
                write!(f, "Lease for season {} expired at {}", season, expired_at)
            }
        }
    }
}

impl std::error::Error for LeaseStateError {}
