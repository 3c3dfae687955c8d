//! Integration facade
//!
//! Wires the fallback chain, the two caches and the discovery services
//! into one handle. Construction is cheap; background health probing only
//! runs when asked for.

use crate::asset_cache::{AssetCache, AssetCacheStats};
use crate::assembler::{PortfolioAssembler, PortfolioSnapshot};
use crate::balance_cache::{BalanceCache, BalanceCacheStats};
use crate::balance_discovery::{
    BalanceDiscoveryConfig, BalanceDiscoveryService, WalletBalance,
};
use crate::config::{DiscoveryOptions, FetchOptions, IntegrationConfig};
use crate::progress::{ProgressEvent, ProgressListeners};
use crate::rpc_api::RpcReader;
use crate::token_discovery::{DiscoveryResult, TokenDiscoveryConfig, TokenDiscoveryService};
use sol_rpc::{
    default_endpoints, ChainConfig, EndpointConfig, EndpointStateSnapshot, FallbackChain,
    HttpTransport, MetricsSnapshot, RpcTransport,
};
use sol_types::{AssetRecord, DomainError};
use std::sync::Arc;
use tracing::{info, warn};

/// Client-side handle over the whole read pipeline
pub struct SolIntegration {
    chain: Arc<FallbackChain>,
    balance_cache: Arc<BalanceCache>,
    asset_cache: Arc<AssetCache>,
    balances: BalanceDiscoveryService,
    tokens: TokenDiscoveryService,
    progress: Arc<ProgressListeners>,
}

impl SolIntegration {
    /// Build with the default HTTP transport
    pub fn new(config: IntegrationConfig) -> Result<Self, DomainError> {
        let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Build over an explicit transport; the seam the tests use
    pub fn with_transport(
        config: IntegrationConfig,
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self, DomainError> {
        let mut endpoints = if config.rpc_endpoints.is_empty() {
            default_endpoints(config.environment)
        } else {
            config.rpc_endpoints.clone()
        };

        if !config.enable_circuit_breaker {
            // Same execute path, thresholds nothing real can reach
            for endpoint in &mut endpoints {
                endpoint.breaker.failure_threshold = u32::MAX;
            }
        }

        let chain_config = ChainConfig {
            commitment: config.commitment,
            ..ChainConfig::default()
        };
        let chain = Arc::new(FallbackChain::new(endpoints, chain_config, transport)?);

        if config.enable_health_monitoring {
            chain.start_health_monitoring();
        }

        let balance_cache = Arc::new(BalanceCache::new(config.cache_ttl));
        let asset_cache = Arc::new(AssetCache::with_defaults());
        let progress = Arc::new(ProgressListeners::new());
        let reader = RpcReader::new(chain.clone());

        let balances = BalanceDiscoveryService::new(
            reader.clone(),
            balance_cache.clone(),
            asset_cache.clone(),
            BalanceDiscoveryConfig {
                max_retries: config.max_retries,
                retry_base_delay: config.retry_base_delay,
                ..BalanceDiscoveryConfig::default()
            },
            progress.clone(),
        );
        let tokens = TokenDiscoveryService::new(
            reader,
            asset_cache.clone(),
            TokenDiscoveryConfig {
                max_retries: config.max_retries,
                retry_base_delay: config.retry_base_delay,
            },
        );

        info!("Integration client ready ({:?})", config.environment);

        Ok(Self {
            chain,
            balance_cache,
            asset_cache,
            balances,
            tokens,
            progress,
        })
    }

    /// Balance view of one wallet
    pub async fn fetch_wallet_balance(
        &self,
        wallet: &str,
        options: &FetchOptions,
    ) -> Result<WalletBalance, DomainError> {
        self.balances.fetch_wallet_balance(wallet, options).await
    }

    /// Balance views of several wallets, bounded fan-out
    pub async fn fetch_multiple_wallet_balances(
        &self,
        wallets: &[String],
        options: &FetchOptions,
    ) -> Vec<Result<WalletBalance, DomainError>> {
        self.balances
            .fetch_multiple_wallet_balances(wallets, options)
            .await
    }

    /// Token/NFT discovery for one wallet
    pub async fn discover_tokens(
        &self,
        wallet: &str,
        options: &DiscoveryOptions,
    ) -> Result<DiscoveryResult, DomainError> {
        self.tokens.discover_tokens(wallet, options).await
    }

    /// Re-fetch and upsert metadata for known mints
    pub async fn refresh_token_metadata(&self, mints: &[String]) -> Result<usize, DomainError> {
        self.tokens.refresh_token_metadata(mints).await
    }

    /// Full portfolio snapshot: balances joined with discovered metadata.
    /// Discovery problems degrade the snapshot to placeholder names rather
    /// than failing the whole request.
    pub async fn get_portfolio(
        &self,
        wallet: &str,
        options: &FetchOptions,
    ) -> Result<PortfolioSnapshot, DomainError> {
        let balance = self.balances.fetch_wallet_balance(wallet, options).await?;

        let discovery = if balance.token_balances.is_empty() && !options.include_nfts {
            None
        } else {
            let discovery_options = DiscoveryOptions {
                include_zero_balances: options.include_zero_balances,
                include_nfts: options.include_nfts,
                ..DiscoveryOptions::default()
            };
            match self.tokens.discover_tokens(wallet, &discovery_options).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("Token discovery failed for {}, assembling without it: {}", wallet, e);
                    None
                }
            }
        };

        Ok(PortfolioAssembler::assemble(
            &balance,
            discovery.as_ref(),
            &self.asset_cache,
        ))
    }

    /// Cached metadata for one mint
    pub fn get_asset(&self, mint: &str) -> Result<AssetRecord, DomainError> {
        self.asset_cache
            .find_by_mint(mint)
            .ok_or_else(|| DomainError::AssetNotFound {
                mint: mint.to_string(),
            })
    }

    pub fn get_verified_assets(&self) -> Vec<AssetRecord> {
        self.asset_cache.get_verified_assets()
    }

    /// Subscribe to discovery progress; listeners run synchronously at
    /// the emission point
    pub fn on_progress(&self, listener: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        self.progress.subscribe(listener);
    }

    pub fn invalidate_wallet(&self, wallet: &str) -> usize {
        self.balance_cache.invalidate_wallet(wallet)
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.chain.get_metrics()
    }

    pub fn get_endpoint_states(&self) -> Vec<EndpointStateSnapshot> {
        self.chain.get_endpoint_states()
    }

    pub fn start_health_monitoring(&self) {
        self.chain.start_health_monitoring();
    }

    pub fn stop_health_monitoring(&self) {
        self.chain.stop_health_monitoring();
    }

    /// Hot-swap the endpoint table under the chain's exclusive lock
    pub fn update_endpoints(&self, endpoints: Vec<EndpointConfig>) -> Result<(), DomainError> {
        self.chain.update_endpoints(endpoints)
    }

    pub fn balance_cache_stats(&self) -> BalanceCacheStats {
        self.balance_cache.stats()
    }

    pub fn asset_cache_stats(&self) -> AssetCacheStats {
        self.asset_cache.stats()
    }

    /// Stop background work and drop endpoint state; the handle is inert
    /// afterwards
    pub fn shutdown(&self) {
        self.chain.destroy();
    }
}
