//! Domain value objects for Solana wallet-state reads
//!
//! Validation happens once at construction; downstream layers treat these
//! values as already checked. No I/O lives in this crate.

pub mod address;
pub mod amount;
pub mod asset;
pub mod error;

pub use address::WalletAddress;
pub use amount::{TokenAmount, MAX_DECIMALS, NATIVE_DECIMALS};
pub use asset::{AssetKind, AssetRecord, TokenAccountInfo, TokenAccountState, TokenMetadata};
pub use error::DomainError;

/// Mint address the native balance is keyed under (wrapped SOL)
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";
