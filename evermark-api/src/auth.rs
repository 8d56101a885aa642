//! Admin authentication for the refresh trigger.
//!
//! Reads are public. `POST /leaderboard/refresh` requires one of the
//! configured admin keys in the `x-api-key` header; with no keys configured
//! (development only) the trigger is open.

use std::collections::HashSet;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::constants::API_KEY_HEADER;
use crate::error::{ApiError, ApiResult};

/// Configured admin keys, stored as SHA-256 digests.
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
    key_digests: HashSet<[u8; 32]>,
}

fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

impl AdminAuth {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            key_digests: keys
                .into_iter()
                .map(|k| k.as_ref().trim().to_string())
                .filter(|k| !k.is_empty())
                .map(|k| digest(&k))
                .collect(),
        }
    }

    /// No keys configured.
    pub fn is_open(&self) -> bool {
        self.key_digests.is_empty()
    }

    pub fn is_valid_key(&self, key: &str) -> bool {
        self.key_digests.contains(&digest(key.trim()))
    }

    /// Check the request headers for a valid admin key.
    pub fn authorize(&self, headers: &HeaderMap) -> ApiResult<()> {
        if self.is_open() {
            return Ok(());
        }

        let key = headers
            .get(API_KEY_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing x-api-key header"))?
            .to_str()
            .map_err(|_| ApiError::unauthorized("Malformed x-api-key header"))?;

        if self.is_valid_key(key) {
            Ok(())
        } else {
            tracing::warn!("Rejected refresh trigger with invalid API key");
            Err(ApiError::forbidden("Invalid API key"))
        }
    }
}
