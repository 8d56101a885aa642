//! Season contract cross-check.
//!
//! Reads the season number the voting contract believes is current through
//! a plain `eth_call` JSON-RPC request. The value is only compared with the
//! date-derived season and displayed; it never decides which season a run
//! aggregates.

use std::time::Duration;

use ::async_trait::async_trait;
use evermark_core::{EvermarkError, EvermarkResult, SeasonNumber, ValidationError};
use serde::Deserialize;
use serde_json::json;

use crate::constants::CHAIN_RPC_TIMEOUT_SECS;

/// Anything that can report the contract's current season.
#[async_trait]
pub trait SeasonReporter: Send + Sync {
    async fn reported_season(&self) -> EvermarkResult<SeasonNumber>;
}

/// JSON-RPC endpoint and call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// Season contract address.
    pub contract: String,
    /// ABI-encoded call returning the current season as a uint256.
    pub calldata: String,
    pub timeout: Duration,
}

impl ChainConfig {
    /// `None` unless `EVERMARK_CHAIN_RPC_URL`, `EVERMARK_SEASON_CONTRACT` and
    /// `EVERMARK_SEASON_CALLDATA` are all set.
    pub fn from_env() -> Option<Self> {
        let var = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            rpc_url: var("EVERMARK_CHAIN_RPC_URL")?,
            contract: var("EVERMARK_SEASON_CONTRACT")?,
            calldata: var("EVERMARK_SEASON_CALLDATA")?,
            timeout: Duration::from_secs(CHAIN_RPC_TIMEOUT_SECS),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// `eth_call` client for the season contract.
#[derive(Debug, Clone)]
pub struct ChainClient {
    http: reqwest::Client,
    config: ChainConfig,
}

impl ChainClient {
    pub fn new(config: ChainConfig) -> EvermarkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                EvermarkError::invalid_configuration(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

#[async_trait]
impl SeasonReporter for ChainClient {
    async fn reported_season(&self) -> EvermarkResult<SeasonNumber> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": self.config.contract, "data": self.config.calldata },
                "latest"
            ],
        });

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EvermarkError::source_unavailable("chain rpc", e.to_string()))?;

        if !response.status().is_success() {
            return Err(EvermarkError::source_unavailable(
                "chain rpc",
                format!("HTTP {}", response.status()),
            ));
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| EvermarkError::source_unavailable("chain rpc", e.to_string()))?;

        if let Some(err) = rpc.error {
            return Err(EvermarkError::source_unavailable(
                "chain rpc",
                format!("eth_call failed ({}): {}", err.code, err.message),
            ));
        }
        let result = rpc.result.ok_or_else(|| {
            EvermarkError::source_unavailable("chain rpc", "response has neither result nor error")
        })?;

        Ok(decode_season(&result)?)
    }
}

fn invalid_result(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: "eth_call result".to_string(),
        reason: reason.into(),
    }
}

/// Decode an ABI-encoded uint256 return value into a season number.
pub fn decode_season(raw: &str) -> Result<SeasonNumber, ValidationError> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| invalid_result("missing 0x prefix"))?;
    if digits.is_empty() {
        return Err(invalid_result("empty return data"));
    }

    // Odd-length quantities are legal in JSON-RPC; left-pad to whole bytes.
    let padded = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    let bytes = hex::decode(&padded).map_err(|e| invalid_result(e.to_string()))?;
    if bytes.len() > 32 {
        return Err(invalid_result(format!("{} bytes is longer than a uint256", bytes.len())));
    }

    let split = bytes.len().saturating_sub(4);
    let (high, low) = bytes.split_at(split);
    if high.iter().any(|b| *b != 0) {
        return Err(invalid_result("season does not fit in 32 bits"));
    }

    let value = low.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    if value == 0 {
        return Err(invalid_result("contract reported season 0"));
    }
    Ok(value)
}
