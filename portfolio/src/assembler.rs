//! Portfolio snapshot assembly
//!
//! Joins the balance view and the discovery output through the mint key.
//! The assembler is stateless and idempotent: the same inputs always
//! materialize the same snapshot. USD fields stay empty until a pricing
//! collaborator exists.

use crate::asset_cache::AssetCache;
use crate::balance_discovery::WalletBalance;
use crate::token_discovery::DiscoveryResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sol_types::{AssetRecord, TokenAmount, TokenMetadata};

/// One fungible position in the snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHolding {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub balance: TokenAmount,
    pub decimals: u8,
    #[serde(rename = "valueUSD", skip_serializing_if = "Option::is_none")]
    pub value_usd: Option<f64>,
}

/// One NFT in the snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NftHolding {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

/// The materialized wallet portfolio
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub address: String,
    /// Always `None`: no pricing collaborator is wired
    #[serde(rename = "totalValueUSD")]
    pub total_value_usd: Option<f64>,
    pub sol_balance: TokenAmount,
    pub token_count: usize,
    pub nft_count: usize,
    pub tokens: Vec<TokenHolding>,
    pub nfts: Vec<NftHolding>,
    pub last_updated: DateTime<Utc>,
}

/// Stateless snapshot builder
pub struct PortfolioAssembler;

impl PortfolioAssembler {
    /// Join a balance view with discovery output. Token names come from
    /// the discovery records when present, falling back to the asset
    /// cache, then to unknown placeholders.
    pub fn assemble(
        balance: &WalletBalance,
        discovery: Option<&DiscoveryResult>,
        assets: &AssetCache,
    ) -> PortfolioSnapshot {
        let discovered: Vec<&AssetRecord> = discovery
            .map(|d| d.tokens.iter().chain(d.nfts.iter()).collect())
            .unwrap_or_default();

        let lookup = |mint: &str| -> Option<AssetRecord> {
            discovered
                .iter()
                .find(|record| record.mint == mint)
                .map(|record| (*record).clone())
                .or_else(|| assets.find_by_mint(mint))
        };

        let mut tokens = Vec::new();
        let mut nfts = Vec::new();

        for position in &balance.token_balances {
            match lookup(&position.mint) {
                Some(record) if record.is_nft() => nfts.push(nft_holding(&record)),
                Some(record) => tokens.push(token_holding(
                    &position.mint,
                    &position.amount,
                    &record.metadata,
                )),
                None => tokens.push(token_holding(
                    &position.mint,
                    &position.amount,
                    &TokenMetadata::unknown(position.amount.decimals()),
                )),
            }
        }

        // NFTs found by discovery but filtered out of the balance view
        // (for example zero-filtered unit amounts) still belong in the
        // snapshot when the discovery ran
        if let Some(result) = discovery {
            for record in &result.nfts {
                if !nfts.iter().any(|n: &NftHolding| n.mint == record.mint) {
                    nfts.push(nft_holding(record));
                }
            }
        }

        PortfolioSnapshot {
            address: balance.wallet.clone(),
            total_value_usd: None,
            sol_balance: balance.native_balance.clone(),
            token_count: tokens.len(),
            nft_count: nfts.len(),
            tokens,
            nfts,
            last_updated: balance.last_updated,
        }
    }
}

fn token_holding(mint: &str, amount: &TokenAmount, metadata: &TokenMetadata) -> TokenHolding {
    TokenHolding {
        mint: mint.to_string(),
        symbol: metadata.symbol.clone(),
        name: metadata.name.clone(),
        balance: amount.clone(),
        decimals: amount.decimals(),
        value_usd: None,
    }
}

fn nft_holding(record: &AssetRecord) -> NftHolding {
    NftHolding {
        mint: record.mint.clone(),
        name: record.metadata.name.clone(),
        symbol: record.metadata.symbol.clone(),
        uri: record.metadata.logo_uri.clone().unwrap_or_default(),
        collection: record.collection.clone(),
        attributes: record.attributes.clone(),
    }
}
