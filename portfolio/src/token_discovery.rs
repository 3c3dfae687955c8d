//! Token and NFT discovery over DAS-capable endpoints
//!
//! Scans a wallet's token accounts, resolves mint metadata in batches and
//! classifies each mint as a fungible token or an NFT. Failures are
//! per-mint: one bad mint never aborts the batch.

use crate::asset_cache::AssetCache;
use crate::config::DiscoveryOptions;
use crate::rpc_api::{DasAsset, RpcReader};
use serde::Serialize;
use sol_types::{AssetRecord, DomainError, TokenAccountInfo, TokenMetadata, WalletAddress};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A per-mint failure accumulated during discovery
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryIssue {
    pub mint: String,
    pub error: String,
}

/// Outcome of one discovery run
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    pub tokens: Vec<AssetRecord>,
    pub nfts: Vec<AssetRecord>,
    pub token_accounts: Vec<TokenAccountInfo>,
    /// Unique mints that went through classification
    pub processed_count: usize,
    /// Per-mint failures; never fatal to the run
    pub errors: Vec<DiscoveryIssue>,
}

/// Service-level knobs
#[derive(Debug, Clone)]
pub struct TokenDiscoveryConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for TokenDiscoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Token discovery over the fallback chain and the shared asset cache
pub struct TokenDiscoveryService {
    reader: RpcReader,
    assets: Arc<AssetCache>,
    config: TokenDiscoveryConfig,
}

impl TokenDiscoveryService {
    pub fn new(reader: RpcReader, assets: Arc<AssetCache>, config: TokenDiscoveryConfig) -> Self {
        Self {
            reader,
            assets,
            config,
        }
    }

    /// Discover and classify every mint held by a wallet
    pub async fn discover_tokens(
        &self,
        wallet: &str,
        options: &DiscoveryOptions,
    ) -> Result<DiscoveryResult, DomainError> {
        let address = WalletAddress::parse(wallet)?;

        let accounts = self
            .with_retries("getTokenAccountsByOwner", || {
                self.reader.get_token_accounts_by_owner(&address, None)
            })
            .await?;

        let token_accounts: Vec<TokenAccountInfo> = accounts
            .into_iter()
            .filter(|account| options.include_frozen || !account.is_frozen())
            .filter(|account| options.include_zero_balances || !account.is_zero())
            .collect();

        // Unique mints in first-seen order, with the account decimals as a
        // fallback when metadata resolution comes up short
        let mut decimals_by_mint: HashMap<String, u8> = HashMap::new();
        let mut mints: Vec<String> = Vec::new();
        for account in &token_accounts {
            if !decimals_by_mint.contains_key(&account.mint) {
                decimals_by_mint.insert(account.mint.clone(), account.decimals);
                mints.push(account.mint.clone());
            }
        }

        let mut records: Vec<AssetRecord> = Vec::with_capacity(mints.len());
        let mut errors: Vec<DiscoveryIssue> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();

        for chunk in mints.chunks(options.batch_size.max(1)) {
            match self.reader.get_asset_batch(chunk, None).await {
                Ok(assets) => {
                    for (mint, asset) in chunk.iter().zip(assets.into_iter()) {
                        match asset {
                            Some(asset) => records.push(build_record(
                                mint,
                                &asset,
                                decimals_by_mint.get(mint).copied(),
                            )),
                            None => unresolved.push(mint.clone()),
                        }
                    }
                }
                Err(e) => {
                    warn!("Metadata batch of {} mints failed: {}", chunk.len(), e);
                    for mint in chunk {
                        errors.push(DiscoveryIssue {
                            mint: mint.clone(),
                            error: DomainError::MetadataFetch {
                                mint: mint.clone(),
                                message: e.to_string(),
                            }
                            .to_string(),
                        });
                        unresolved.push(mint.clone());
                    }
                }
            }
        }

        // Individual resolution for mints the batch could not answer
        for mint in unresolved {
            let fallback_decimals = decimals_by_mint.get(&mint).copied();
            if options.include_nfts {
                match self.reader.get_asset(&mint, None).await {
                    Ok(asset) => {
                        records.push(build_record(&mint, &asset, fallback_decimals));
                        continue;
                    }
                    Err(e) => {
                        debug!("Individual metadata lookup failed for {}: {}", mint, e);
                        errors.push(DiscoveryIssue {
                            mint: mint.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
            records.push(AssetRecord::token(
                mint,
                TokenMetadata::unknown(fallback_decimals.unwrap_or(0)),
                None,
            ));
        }

        self.assets.save_many(records.clone());

        let (nfts, tokens): (Vec<AssetRecord>, Vec<AssetRecord>) =
            records.into_iter().partition(|record| record.is_nft());

        let nfts = if options.include_nfts { nfts } else { Vec::new() };
        let processed_count = mints.len();

        info!(
            "Discovered {} tokens and {} NFTs for {} ({} errors)",
            tokens.len(),
            nfts.len(),
            address,
            errors.len()
        );

        Ok(DiscoveryResult {
            tokens,
            nfts,
            token_accounts,
            processed_count,
            errors,
        })
    }

    /// Re-fetch metadata for known mints and upsert the results. Per-mint
    /// failures log a warning and do not abort the refresh.
    pub async fn refresh_token_metadata(&self, mints: &[String]) -> Result<usize, DomainError> {
        let mut refreshed = 0usize;

        for chunk in mints.chunks(50) {
            match self.reader.get_asset_batch(chunk, None).await {
                Ok(assets) => {
                    let mut records = Vec::new();
                    for (mint, asset) in chunk.iter().zip(assets.into_iter()) {
                        match asset {
                            Some(asset) => records.push(build_record(mint, &asset, None)),
                            None => warn!("Metadata refresh found nothing for {}", mint),
                        }
                    }
                    refreshed += records.len();
                    self.assets.save_many(records);
                }
                Err(e) => {
                    warn!("Metadata refresh batch failed: {}", e);
                }
            }
        }

        Ok(refreshed)
    }

    async fn with_retries<T, F, Fut>(&self, label: &str, call: F) -> Result<T, DomainError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        label, attempt, max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Interfaces a DAS provider uses for non-fungible assets
const NFT_INTERFACES: [&str; 4] = ["V1_NFT", "LEGACY_NFT", "ProgrammableNFT", "MplCoreAsset"];

/// Deterministic classification: a mint is an NFT iff its decimals are
/// zero with supply at most one, or edition/interface metadata marks it as
/// one. Everything else is a fungible token.
fn build_record(mint: &str, asset: &DasAsset, fallback_decimals: Option<u8>) -> AssetRecord {
    let token_info = asset.token_info.as_ref();
    let decimals = token_info
        .and_then(|t| t.decimals)
        .or(fallback_decimals)
        .unwrap_or(0);
    let supply = token_info.and_then(|t| t.supply);

    let zero_decimal_unit_supply = decimals == 0 && supply.map(|s| s <= 1).unwrap_or(false);
    let nft_interface = asset
        .interface
        .as_deref()
        .map(|i| NFT_INTERFACES.contains(&i))
        .unwrap_or(false);
    let master_edition = asset
        .supply
        .as_ref()
        .map(|s| s.print_max_supply.is_some() || s.edition_nonce.is_some())
        .unwrap_or(false);

    let metadata = TokenMetadata {
        name: asset.name().unwrap_or_else(|| "Unknown".to_string()),
        symbol: asset.symbol().unwrap_or_else(|| "UNKNOWN".to_string()),
        decimals,
        logo_uri: asset.uri(),
        verified: asset.has_verified_creator(),
        tags: Vec::new(),
    };

    if zero_decimal_unit_supply || nft_interface || master_edition {
        AssetRecord::nft(mint, metadata, supply)
            .with_collection(asset.collection())
            .with_attributes(asset.attributes())
    } else {
        AssetRecord::token(mint, metadata, supply)
    }
}
