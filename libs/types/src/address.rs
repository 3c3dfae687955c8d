//! Validated wallet address value object
//!
//! A `WalletAddress` is the opaque 32-byte account key together with its
//! canonical base58 form. Validation happens once at construction; every
//! other layer treats the value as already checked.

use crate::error::DomainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a raw account key in bytes
pub const ADDRESS_LEN: usize = 32;

/// A validated Solana account address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletAddress {
    bytes: [u8; ADDRESS_LEN],
    base58: String,
}

impl WalletAddress {
    /// Parse and validate a base58-encoded address.
    ///
    /// Checks the base58 alphabet and the decoded length. The on-curve
    /// check is the concern of an external validator and is not repeated
    /// here.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidAddress("empty address".to_string()));
        }

        let decoded = bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| DomainError::InvalidAddress(format!("{}: {}", trimmed, e)))?;

        let bytes: [u8; ADDRESS_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            DomainError::InvalidAddress(format!(
                "{}: expected {} bytes, got {}",
                trimmed,
                ADDRESS_LEN,
                v.len()
            ))
        })?;

        Ok(Self {
            bytes,
            base58: trimmed.to_string(),
        })
    }

    /// Raw 32-byte key
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.bytes
    }

    /// Canonical base58 form
    pub fn as_str(&self) -> &str {
        &self.base58
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base58)
    }
}

impl FromStr for WalletAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.base58)
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
