//! Token amounts in raw units with fixed decimals
//!
//! Amounts are kept as unbounded non-negative integers in the token's
//! smallest unit. Arithmetic requires matching decimals; mixing scales is
//! a validation error, not a silent conversion.

use crate::error::DomainError;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Maximum supported decimal places
pub const MAX_DECIMALS: u8 = 30;

/// Decimals of the native SOL balance (lamports)
pub const NATIVE_DECIMALS: u8 = 9;

/// An amount of some token in raw (smallest-unit) form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAmount {
    raw: BigUint,
    decimals: u8,
}

impl TokenAmount {
    /// Create an amount from raw units
    pub fn new(raw: BigUint, decimals: u8) -> Result<Self, DomainError> {
        if decimals > MAX_DECIMALS {
            return Err(DomainError::Validation(format!(
                "decimals {} exceeds maximum {}",
                decimals, MAX_DECIMALS
            )));
        }
        Ok(Self { raw, decimals })
    }

    /// Parse a raw unit string, e.g. the `amount` field of a token account
    pub fn from_raw_str(raw: &str, decimals: u8) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.starts_with('-') {
            return Err(DomainError::Validation(format!(
                "negative amount: {}",
                trimmed
            )));
        }
        let parsed = trimmed.parse::<BigUint>().map_err(|e| {
            DomainError::Validation(format!("invalid raw amount {:?}: {}", trimmed, e))
        })?;
        Self::new(parsed, decimals)
    }

    /// Amount of raw units from an integer, e.g. a lamport balance
    pub fn from_u64(raw: u64, decimals: u8) -> Result<Self, DomainError> {
        Self::new(BigUint::from(raw), decimals)
    }

    /// Zero with the given scale
    pub fn zero(decimals: u8) -> Self {
        Self {
            raw: BigUint::zero(),
            decimals,
        }
    }

    pub fn raw(&self) -> &BigUint {
        &self.raw
    }

    /// Raw units rendered as a decimal string
    pub fn raw_string(&self) -> String {
        self.raw.to_string()
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    fn require_same_scale(&self, other: &Self) -> Result<(), DomainError> {
        if self.decimals != other.decimals {
            return Err(DomainError::Validation(format!(
                "decimals mismatch: {} vs {}",
                self.decimals, other.decimals
            )));
        }
        Ok(())
    }

    /// Sum of two amounts with the same scale
    pub fn checked_add(&self, other: &Self) -> Result<Self, DomainError> {
        self.require_same_scale(other)?;
        Ok(Self {
            raw: &self.raw + &other.raw,
            decimals: self.decimals,
        })
    }

    /// Difference of two amounts with the same scale; going below zero is
    /// an insufficient-balance error
    pub fn checked_sub(&self, other: &Self) -> Result<Self, DomainError> {
        self.require_same_scale(other)?;
        if other.raw > self.raw {
            return Err(DomainError::InsufficientBalance {
                required: other.raw.to_string(),
                available: self.raw.to_string(),
            });
        }
        Ok(Self {
            raw: &self.raw - &other.raw,
            decimals: self.decimals,
        })
    }

    /// Human-oriented rendering with a decimal point, e.g. "1.000000000"
    pub fn ui_string(&self) -> String {
        if self.decimals == 0 {
            return self.raw.to_string();
        }
        let digits = self.raw.to_string();
        let scale = self.decimals as usize;
        if digits.len() <= scale {
            format!("0.{:0>width$}", digits, width = scale)
        } else {
            let split = digits.len() - scale;
            format!("{}.{}", &digits[..split], &digits[split..])
        }
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ui_string())
    }
}

#[derive(Serialize, Deserialize)]
struct AmountWire {
    amount: String,
    decimals: u8,
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AmountWire {
            amount: self.raw.to_string(),
            decimals: self.decimals,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = AmountWire::deserialize(deserializer)?;
        TokenAmount::from_raw_str(&wire.amount, wire.decimals).map_err(serde::de::Error::custom)
    }
}
