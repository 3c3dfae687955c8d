//! Wallet balance discovery pipeline
//!
//! Orchestrates the native-balance and token-account fetches with retries,
//! reads and writes the balance cache, and emits progress along the way.
//! A discovery pass runs Start → CheckCache → FetchNative → FetchAccounts
//! → Classify → Persist strictly in order; the batch write at the end is
//! synchronous, so cancellation anywhere earlier leaves the cache
//! untouched.

use crate::balance_cache::{BalanceCache, BalanceCacheEntry, BalanceSnapshot};
use crate::asset_cache::AssetCache;
use crate::config::FetchOptions;
use crate::progress::{DiscoveryPhase, ProgressListeners};
use crate::rpc_api::RpcReader;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sol_types::{DomainError, TokenAmount, WalletAddress, NATIVE_DECIMALS, NATIVE_MINT};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One token position inside a wallet balance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenBalance {
    pub mint: String,
    pub amount: TokenAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_account: Option<String>,
}

/// Full balance view of one wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletBalance {
    pub wallet: String,
    pub native_balance: TokenAmount,
    pub token_balances: Vec<TokenBalance>,
    /// Native account plus token accounts
    pub total_accounts: usize,
    pub last_updated: DateTime<Utc>,
    pub from_cache: bool,
}

/// Service-level knobs
#[derive(Debug, Clone)]
pub struct BalanceDiscoveryConfig {
    /// Attempt ceiling per RPC read
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    pub retry_base_delay: Duration,
    /// Concurrent wallets in a batch fetch
    pub batch_concurrency: usize,
}

impl Default for BalanceDiscoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            batch_concurrency: 5,
        }
    }
}

/// Balance discovery over the fallback chain and the shared caches
pub struct BalanceDiscoveryService {
    reader: RpcReader,
    cache: Arc<BalanceCache>,
    assets: Arc<AssetCache>,
    config: BalanceDiscoveryConfig,
    progress: Arc<ProgressListeners>,
}

impl BalanceDiscoveryService {
    pub fn new(
        reader: RpcReader,
        cache: Arc<BalanceCache>,
        assets: Arc<AssetCache>,
        config: BalanceDiscoveryConfig,
        progress: Arc<ProgressListeners>,
    ) -> Self {
        Self {
            reader,
            cache,
            assets,
            config,
            progress,
        }
    }

    /// Fetch the full balance view of one wallet, preferring a fresh
    /// cached view unless the caller forces a refresh.
    pub async fn fetch_wallet_balance(
        &self,
        wallet: &str,
        options: &FetchOptions,
    ) -> Result<WalletBalance, DomainError> {
        let address = WalletAddress::parse(wallet)?;
        let wallet = address.as_str();

        self.progress.emit(wallet, DiscoveryPhase::CacheCheck, 10);

        if !options.force_refresh {
            if let Some(balance) = self.cached_view(wallet, options) {
                debug!("Serving {} from cache", wallet);
                self.progress.emit(wallet, DiscoveryPhase::Complete, 100);
                return Ok(balance);
            }
        }

        let result = self.fetch_fresh(&address, options).await;
        match &result {
            Ok(_) => self.progress.emit(wallet, DiscoveryPhase::Complete, 100),
            Err(e) => {
                warn!("Balance discovery failed for {}: {}", wallet, e);
                self.progress.emit(wallet, DiscoveryPhase::Failed, 100);
            }
        }
        result
    }

    /// Fetch several wallets with bounded concurrency, preserving order.
    /// Per-wallet failures stay per-wallet.
    pub async fn fetch_multiple_wallet_balances(
        &self,
        wallets: &[String],
        options: &FetchOptions,
    ) -> Vec<Result<WalletBalance, DomainError>> {
        stream::iter(wallets)
            .map(|wallet| self.fetch_wallet_balance(wallet, options))
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await
    }

    /// Rebuild a wallet view from cache. The view is usable only if the
    /// native entry is present and every entry is within the caller's
    /// max age; one stale entry rejects the whole view.
    fn cached_view(&self, wallet: &str, options: &FetchOptions) -> Option<WalletBalance> {
        let entries = self.cache.get_wallet_balances(wallet);
        if entries.is_empty() {
            return None;
        }

        let max_age = options.max_cache_age.unwrap_or(self.cache.default_ttl());
        if entries.iter().any(|entry| entry.age() > max_age) {
            debug!("Cached view for {} rejected (stale entry)", wallet);
            return None;
        }

        let native = entries
            .iter()
            .find(|entry| entry.snapshot.mint == NATIVE_MINT)?;

        let token_balances = self.collect_token_balances(&entries, options);
        Some(WalletBalance {
            wallet: wallet.to_string(),
            native_balance: native.snapshot.amount.clone(),
            total_accounts: 1 + token_balances.len(),
            token_balances,
            last_updated: native.snapshot.observed_at,
            from_cache: true,
        })
    }

    fn collect_token_balances(
        &self,
        entries: &[BalanceCacheEntry],
        options: &FetchOptions,
    ) -> Vec<TokenBalance> {
        let mut balances: Vec<TokenBalance> = entries
            .iter()
            .filter(|entry| entry.snapshot.mint != NATIVE_MINT)
            .filter(|entry| options.include_zero_balances || !entry.snapshot.amount.is_zero())
            .filter(|entry| options.include_nfts || !self.is_known_nft(&entry.snapshot.mint))
            .map(|entry| TokenBalance {
                mint: entry.snapshot.mint.clone(),
                amount: entry.snapshot.amount.clone(),
                token_account: entry.snapshot.token_account.clone(),
            })
            .collect();
        // Deterministic order so cached and fresh views compare equal
        balances.sort_by(|a, b| a.mint.cmp(&b.mint));
        balances
    }

    async fn fetch_fresh(
        &self,
        address: &WalletAddress,
        options: &FetchOptions,
    ) -> Result<WalletBalance, DomainError> {
        let wallet = address.as_str();

        let lamports = self
            .with_retries("getBalance", || {
                self.reader.get_native_balance(address, options.timeout)
            })
            .await?;
        self.progress.emit(wallet, DiscoveryPhase::FetchNative, 30);

        self.progress.emit(wallet, DiscoveryPhase::FetchAccounts, 30);
        let accounts = self
            .with_retries("getTokenAccountsByOwner", || {
                self.reader.get_token_accounts_by_owner(address, options.timeout)
            })
            .await?;

        // Best-effort snapshot tag; a missing slot never fails discovery
        let slot = match self.reader.get_slot(options.timeout).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Slot fetch failed for {}, tagging snapshots with 0: {}", wallet, e);
                0
            }
        };

        let observed_at = Utc::now();
        let native_balance = TokenAmount::from_u64(lamports, NATIVE_DECIMALS)?;

        let mut snapshots = vec![BalanceSnapshot {
            wallet: wallet.to_string(),
            mint: NATIVE_MINT.to_string(),
            amount: native_balance.clone(),
            token_account: None,
            slot,
            observed_at,
        }];

        let eligible: Vec<_> = accounts
            .into_iter()
            .filter(|account| !account.is_frozen())
            .filter(|account| options.include_zero_balances || !account.is_zero())
            .collect();

        let mut token_balances = Vec::with_capacity(eligible.len());
        let total = eligible.len();
        for (index, account) in eligible.into_iter().enumerate() {
            if !options.include_nfts && self.is_known_nft(&account.mint) {
                continue;
            }

            let amount = TokenAmount::from_raw_str(&account.raw_amount, account.decimals)?;
            snapshots.push(BalanceSnapshot {
                wallet: wallet.to_string(),
                mint: account.mint.clone(),
                amount: amount.clone(),
                token_account: Some(account.pubkey.clone()),
                slot,
                observed_at,
            });
            token_balances.push(TokenBalance {
                mint: account.mint,
                amount,
                token_account: Some(account.pubkey),
            });

            let percent = 30 + ((index + 1) * 60 / total.max(1)) as u8;
            self.progress.emit(wallet, DiscoveryPhase::Classify, percent);
        }

        token_balances.sort_by(|a, b| a.mint.cmp(&b.mint));

        self.progress.emit(wallet, DiscoveryPhase::Persist, 95);
        // Single batch commit: every snapshot carries the same slot and
        // observation time, and readers see all of them or none
        self.cache.save_balances(snapshots, None);

        info!(
            "Discovered {} token balances for {} at slot {}",
            token_balances.len(),
            wallet,
            slot
        );

        Ok(WalletBalance {
            wallet: wallet.to_string(),
            native_balance,
            total_accounts: 1 + token_balances.len(),
            token_balances,
            last_updated: observed_at,
            from_cache: false,
        })
    }

    fn is_known_nft(&self, mint: &str) -> bool {
        self.assets
            .find_by_mint(mint)
            .map(|record| record.is_nft())
            .unwrap_or(false)
    }

    /// Retry loop for one RPC read: retryable errors back off
    /// exponentially, terminal errors surface immediately.
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
