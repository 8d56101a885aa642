//! Token amounts in base units.
//!
//! Votes are denominated in an 18-decimal token. Amounts are kept as
//! arbitrary-precision unsigned integers of base units (wei) and cross every
//! boundary (JSON, SQL) as decimal strings.

use num_bigint::BigUint;
use num_traits::{Num, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use crate::error::ValidationError;

/// Non-negative token amount in base units.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema), schema(value_type = String))]
pub struct TokenAmount(BigUint);

impl TokenAmount {
    /// Decimal places of the voting token.
    pub const DECIMALS: usize = 18;

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_wei(wei: u128) -> Self {
        Self(BigUint::from(wei))
    }

    /// Whole tokens, i.e. `tokens * 10^18` base units.
    pub fn from_tokens(tokens: u64) -> Self {
        Self(BigUint::from(tokens) * BigUint::from(10u32).pow(Self::DECIMALS as u32))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Parse a base-unit decimal string. Signs, fractions and exponents are
    /// rejected.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "amount".to_string(),
            });
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidValue {
                field: "amount".to_string(),
                reason: format!("'{}' is not a non-negative integer of base units", trimmed),
            });
        }
        BigUint::from_str_radix(trimmed, 10)
            .map(Self)
            .map_err(|e| ValidationError::InvalidValue {
                field: "amount".to_string(),
                reason: e.to_string(),
            })
    }

    /// Human-readable token value, e.g. `1.5` for 1.5 * 10^18 base units.
    pub fn to_token_string(&self) -> String {
        let digits = self.0.to_str_radix(10);
        let padded = if digits.len() <= Self::DECIMALS {
            format!("{:0>width$}", digits, width = Self::DECIMALS + 1)
        } else {
            digits
        };
        let (whole, frac) = padded.split_at(padded.len() - Self::DECIMALS);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, frac)
        }
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for TokenAmount {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl Add for TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl<'a> AddAssign<&'a TokenAmount> for TokenAmount {
    fn add_assign(&mut self, rhs: &'a TokenAmount) {
        self.0 += &rhs.0;
    }
}

impl<'a> Sum<&'a TokenAmount> for TokenAmount {
    fn sum<I: Iterator<Item = &'a TokenAmount>>(iter: I) -> Self {
        iter.fold(TokenAmount::zero(), |mut acc, amount| {
            acc += amount;
            acc
        })
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = TokenAmount>>(iter: I) -> Self {
        iter.fold(TokenAmount::zero(), |acc, amount| acc + amount)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

struct TokenAmountVisitor;

impl<'de> Visitor<'de> for TokenAmountVisitor {
    type Value = TokenAmount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer amount as a decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        TokenAmount::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(TokenAmount::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(TokenAmount::from)
            .map_err(|_| E::custom(format!("amount must be non-negative, got {}", v)))
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TokenAmountVisitor)
    }
}
