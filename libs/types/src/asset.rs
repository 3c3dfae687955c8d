//! Asset records and token account shapes
//!
//! `AssetRecord` is what discovery learns about a mint; `TokenAccountInfo`
//! is the transient per-fetch view of a holder account.

use serde::{Deserialize, Serialize};

/// Kind of asset behind a mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// The chain's base asset (SOL)
    Native,
    /// Fungible token
    Token,
    /// Non-fungible token: zero decimals, supply at most one
    Nft,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Native => write!(f, "native"),
            AssetKind::Token => write!(f, "token"),
            AssetKind::Nft => write!(f, "nft"),
        }
    }
}

/// Descriptive metadata for a mint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    /// Observed verification fact, not a contract
    pub verified: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TokenMetadata {
    /// Placeholder metadata for a mint nothing could resolve
    pub fn unknown(decimals: u8) -> Self {
        Self {
            name: "Unknown".to_string(),
            symbol: "UNKNOWN".to_string(),
            decimals,
            logo_uri: None,
            verified: false,
            tags: Vec::new(),
        }
    }
}

/// Everything discovery knows about one mint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub mint: String,
    pub kind: AssetKind,
    pub metadata: TokenMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supply: Option<u64>,
    /// Collection mint only; the collection itself is resolved on demand
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Raw attribute list as returned by metadata resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
}

impl AssetRecord {
    pub fn token(mint: impl Into<String>, metadata: TokenMetadata, supply: Option<u64>) -> Self {
        Self {
            mint: mint.into(),
            kind: AssetKind::Token,
            metadata,
            supply,
            collection: None,
            attributes: None,
        }
    }

    /// Build an NFT record, forcing the kind's invariants: decimals are
    /// zeroed and supply is capped at one.
    pub fn nft(mint: impl Into<String>, mut metadata: TokenMetadata, supply: Option<u64>) -> Self {
        metadata.decimals = 0;
        Self {
            mint: mint.into(),
            kind: AssetKind::Nft,
            metadata,
            supply: supply.map(|s| s.min(1)),
            collection: None,
            attributes: None,
        }
    }

    pub fn with_collection(mut self, collection: Option<String>) -> Self {
        self.collection = collection;
        self
    }

    pub fn with_attributes(mut self, attributes: Option<serde_json::Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn is_nft(&self) -> bool {
        self.kind == AssetKind::Nft
    }
}

/// On-chain state of a token account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenAccountState {
    Initialized,
    Uninitialized,
    /// Frozen accounts are excluded from active discovery
    Frozen,
}

/// One token account as returned by an owner scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAccountInfo {
    pub pubkey: String,
    pub mint: String,
    pub owner: String,
    /// Raw amount in smallest units, kept as a string
    pub raw_amount: String,
    pub decimals: u8,
    pub state: TokenAccountState,
}

impl TokenAccountInfo {
    pub fn is_frozen(&self) -> bool {
        self.state == TokenAccountState::Frozen
    }

    pub fn is_zero(&self) -> bool {
        self.raw_amount.trim_start_matches('0').is_empty()
    }
}
