//! Wallet balance and token discovery over the resilient RPC layer
//!
//! The pipeline behind a portfolio read:
//! - `BalanceDiscoveryService` fetches native and token balances with
//!   retries and writes slot-tagged snapshots through the TTL cache
//! - `TokenDiscoveryService` resolves mint metadata in batches and
//!   classifies fungible tokens vs NFTs
//! - `PortfolioAssembler` joins both into the externally visible snapshot
//! - `SolIntegration` is the facade wiring it all together
//!
//! Caches are in-memory only; nothing here persists to disk.

pub mod asset_cache;
pub mod assembler;
pub mod balance_cache;
pub mod balance_discovery;
pub mod client;
pub mod config;
pub mod progress;
pub mod rpc_api;
pub mod token_discovery;

pub use asset_cache::{AssetCache, AssetCacheStats};
pub use assembler::{NftHolding, PortfolioAssembler, PortfolioSnapshot, TokenHolding};
pub use balance_cache::{BalanceCache, BalanceCacheEntry, BalanceCacheStats, BalanceSnapshot};
pub use balance_discovery::{
    BalanceDiscoveryConfig, BalanceDiscoveryService, TokenBalance, WalletBalance,
};
pub use client::SolIntegration;
pub use config::{DiscoveryOptions, FetchOptions, IntegrationConfig};
pub use progress::{DiscoveryPhase, ProgressEvent, ProgressListeners};
pub use rpc_api::{DasAsset, RpcReader, TOKEN_PROGRAM_ID};
pub use token_discovery::{
    DiscoveryIssue, DiscoveryResult, TokenDiscoveryConfig, TokenDiscoveryService,
};
