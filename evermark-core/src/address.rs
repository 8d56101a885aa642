//! Wallet addresses of voters and item owners.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Voter or owner identifier, normalized for case-insensitive comparison.
///
/// Addresses are stored trimmed and lowercased, so `==` on two `Address`
/// values is the case-insensitive comparison the self-vote rule needs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema), schema(value_type = String))]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "address".to_string(),
            });
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a `0x`-prefixed, 20-byte hex address.
    pub fn is_evm(&self) -> bool {
        self.0
            .strip_prefix("0x")
            .map(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .unwrap_or(false)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_equality() {
        let checksummed = Address::parse("0xAbC0000000000000000000000000000000000dEf").unwrap();
        let lower = Address::parse(" 0xabc0000000000000000000000000000000000def ").unwrap();
        assert_eq!(checksummed, lower);
        assert!(lower.is_evm());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            Address::parse("   "),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_non_evm_identifiers_allowed() {
        let fid = Address::parse("fid:1234").unwrap();
        assert!(!fid.is_evm());
        assert_eq!(fid.as_str(), "fid:1234");
    }

    #[test]
    fn test_deserialize_normalizes() {
        let addr: Address = serde_json::from_str("\"0xABCD\"").unwrap();
        assert_eq!(addr.as_str(), "0xabcd");
    }
}
