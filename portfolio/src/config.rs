//! Integration and per-call option types

use sol_rpc::{Commitment, EndpointConfig, Environment};
use std::time::Duration;

/// Top-level configuration of the integration facade
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    /// Selects the default endpoint table
    pub environment: Environment,
    /// Overrides the default table when non-empty
    pub rpc_endpoints: Vec<EndpointConfig>,
    /// Read consistency level for every RPC call
    pub commitment: Commitment,
    /// Balance cache TTL
    pub cache_ttl: Duration,
    /// Per-call retry ceiling inside the discovery services
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    pub retry_base_delay: Duration,
    pub enable_circuit_breaker: bool,
    /// Start probing at construction time
    pub enable_health_monitoring: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            rpc_endpoints: Vec::new(),
            commitment: Commitment::default(),
            cache_ttl: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            enable_circuit_breaker: true,
            enable_health_monitoring: false,
        }
    }
}

/// Options for a single wallet balance fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Skip the cache consult entirely
    pub force_refresh: bool,
    pub include_zero_balances: bool,
    pub include_nfts: bool,
    /// Oldest acceptable cache entry; falls back to the cache TTL
    pub max_cache_age: Option<Duration>,
    /// Per-call deadline forwarded to the chain
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            include_zero_balances: false,
            include_nfts: true,
            max_cache_age: None,
            timeout: None,
        }
    }
}

/// Options for a token discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub include_zero_balances: bool,
    pub include_frozen: bool,
    pub include_nfts: bool,
    /// Mints per metadata batch request
    pub batch_size: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            include_zero_balances: false,
            include_frozen: false,
            include_nfts: true,
            batch_size: 50,
        }
    }
}
