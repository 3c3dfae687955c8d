//! Typed reads over the fallback chain
//!
//! Thin wrappers that build the JSON-RPC params for the handful of read
//! methods the pipeline consumes and decode the responses into domain
//! values. Decode failures are terminal network errors; they are the
//! server handing back a shape we do not understand, not something a
//! retry fixes.

use serde::Deserialize;
use serde_json::{json, Value};
use sol_rpc::{ExecuteOptions, FallbackChain};
use sol_types::{DomainError, TokenAccountInfo, TokenAccountState, WalletAddress};
use std::sync::Arc;
use std::time::Duration;

/// SPL token program owning the scanned accounts
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Shared handle the discovery services read through
#[derive(Clone)]
pub struct RpcReader {
    chain: Arc<FallbackChain>,
}

impl RpcReader {
    pub fn new(chain: Arc<FallbackChain>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<FallbackChain> {
        &self.chain
    }

    fn options(&self, method: &str, timeout: Option<Duration>) -> ExecuteOptions {
        let mut options = ExecuteOptions::for_method(method);
        options.timeout = timeout;
        options
    }

    /// Lamport balance of a wallet
    pub async fn get_native_balance(
        &self,
        wallet: &WalletAddress,
        timeout: Option<Duration>,
    ) -> Result<u64, DomainError> {
        let address = wallet.as_str().to_string();
        let value = self
            .chain
            .execute(self.options("getBalance", timeout), |conn| {
                let address = address.clone();
                async move {
                    conn.call(
                        "getBalance",
                        vec![json!(address), conn.commitment_config()],
                    )
                    .await
                }
            })
            .await?;

        let response: ContextResponse<u64> = decode("getBalance", value)?;
        Ok(response.value)
    }

    /// All SPL token accounts owned by a wallet, jsonParsed
    pub async fn get_token_accounts_by_owner(
        &self,
        wallet: &WalletAddress,
        timeout: Option<Duration>,
    ) -> Result<Vec<TokenAccountInfo>, DomainError> {
        let address = wallet.as_str().to_string();
        let value = self
            .chain
            .execute(self.options("getTokenAccountsByOwner", timeout), |conn| {
                let address = address.clone();
                async move {
                    let mut config = conn.commitment_config();
                    config["encoding"] = json!("jsonParsed");
                    conn.call(
                        "getTokenAccountsByOwner",
                        vec![
                            json!(address),
                            json!({ "programId": TOKEN_PROGRAM_ID }),
                            config,
                        ],
                    )
                    .await
                }
            })
            .await?;

        let response: ContextResponse<Vec<KeyedTokenAccount>> =
            decode("getTokenAccountsByOwner", value)?;
        Ok(response
            .value
            .into_iter()
            .map(|keyed| keyed.into_account_info(wallet.as_str()))
            .collect())
    }

    /// Current slot; callers treat failures as best-effort
    pub async fn get_slot(&self, timeout: Option<Duration>) -> Result<u64, DomainError> {
        let value = self
            .chain
            .execute(self.options("getSlot", timeout), |conn| async move {
                conn.call("getSlot", vec![conn.commitment_config()]).await
            })
            .await?;
        decode("getSlot", value)
    }

    /// DAS batch metadata lookup; the result is aligned with `mints`,
    /// with `None` for ids the provider could not resolve.
    pub async fn get_asset_batch(
        &self,
        mints: &[String],
        timeout: Option<Duration>,
    ) -> Result<Vec<Option<DasAsset>>, DomainError> {
        let ids = mints.to_vec();
        let value = self
            .chain
            .execute(self.options("getAssetBatch", timeout), |conn| {
                let ids = ids.clone();
                async move {
                    conn.call("getAssetBatch", vec![json!({ "ids": ids })])
                        .await
                }
            })
            .await?;
        decode("getAssetBatch", value)
    }

    /// DAS single-asset lookup
    pub async fn get_asset(
        &self,
        mint: &str,
        timeout: Option<Duration>,
    ) -> Result<DasAsset, DomainError> {
        let id = mint.to_string();
        let value = self
            .chain
            .execute(self.options("getAsset", timeout), |conn| {
                let id = id.clone();
                async move { conn.call("getAsset", vec![json!({ "id": id })]).await }
            })
            .await?;

        if value.is_null() {
            return Err(DomainError::AssetNotFound {
                mint: mint.to_string(),
            });
        }
        decode("getAsset", value)
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T, DomainError> {
    serde_json::from_value(value).map_err(|e| {
        DomainError::network_fatal(format!("failed to decode {} response: {}", method, e))
    })
}

/// Solana's `{context, value}` envelope
#[derive(Debug, Deserialize)]
struct ContextResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct KeyedTokenAccount {
    pubkey: String,
    account: UiAccount,
}

#[derive(Debug, Deserialize)]
struct UiAccount {
    data: UiAccountData,
}

#[derive(Debug, Deserialize)]
struct UiAccountData {
    parsed: UiParsedData,
}

#[derive(Debug, Deserialize)]
struct UiParsedData {
    info: UiTokenAccountInfo,
}

#[derive(Debug, Deserialize)]
struct UiTokenAccountInfo {
    mint: String,
    #[serde(default)]
    state: Option<TokenAccountState>,
    #[serde(rename = "tokenAmount")]
    token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    amount: String,
    decimals: u8,
}

impl KeyedTokenAccount {
    fn into_account_info(self, owner: &str) -> TokenAccountInfo {
        let info = self.account.data.parsed.info;
        TokenAccountInfo {
            pubkey: self.pubkey,
            mint: info.mint,
            owner: owner.to_string(),
            raw_amount: info.token_amount.amount,
            decimals: info.token_amount.decimals,
            state: info.state.unwrap_or(TokenAccountState::Initialized),
        }
    }
}

/// One asset as described by a DAS provider. Only the fields the
/// classifier and metadata mapping read are modeled; everything else is
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct DasAsset {
    pub id: String,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub content: Option<DasContent>,
    #[serde(default)]
    pub token_info: Option<DasTokenInfo>,
    #[serde(default)]
    pub supply: Option<DasSupply>,
    #[serde(default)]
    pub grouping: Vec<DasGrouping>,
    #[serde(default)]
    pub creators: Vec<DasCreator>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasContent {
    #[serde(default)]
    pub json_uri: Option<String>,
    #[serde(default)]
    pub metadata: Option<DasMetadata>,
    #[serde(default)]
    pub links: Option<DasLinks>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub attributes: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasLinks {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasTokenInfo {
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub supply: Option<u64>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Edition info; a present master edition marks the asset as an NFT
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasSupply {
    #[serde(default)]
    pub print_max_supply: Option<u64>,
    #[serde(default)]
    pub print_current_supply: Option<u64>,
    #[serde(default)]
    pub edition_nonce: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DasGrouping {
    pub group_key: String,
    pub group_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DasCreator {
    pub address: String,
    #[serde(default)]
    pub verified: bool,
}

impl DasAsset {
    /// Collection mint from the grouping list, if any
    pub fn collection(&self) -> Option<String> {
        self.grouping
            .iter()
            .find(|g| g.group_key == "collection")
            .map(|g| g.group_value.clone())
    }

    pub fn name(&self) -> Option<String> {
        self.content
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .and_then(|m| m.name.clone())
    }

    pub fn symbol(&self) -> Option<String> {
        self.content
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .and_then(|m| m.symbol.clone())
            .or_else(|| self.token_info.as_ref().and_then(|t| t.symbol.clone()))
    }

    pub fn uri(&self) -> Option<String> {
        self.content.as_ref().and_then(|c| {
            c.links
                .as_ref()
                .and_then(|l| l.image.clone())
                .or_else(|| c.json_uri.clone())
        })
    }

    pub fn attributes(&self) -> Option<Value> {
        self.content
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .and_then(|m| m.attributes.clone())
    }

    /// Any verified creator counts as a verification fact
    pub fn has_verified_creator(&self) -> bool {
        self.creators.iter().any(|c| c.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_accounts_response() {
        let value = json!({
            "context": { "slot": 100 },
            "value": [{
                "pubkey": "Acc1",
                "account": {
                    "lamports": 2039280,
                    "data": {
                        "program": "spl-token",
                        "parsed": {
                            "type": "account",
                            "info": {
                                "mint": "MintA",
                                "owner": "Wallet1",
                                "state": "initialized",
                                "tokenAmount": {
                                    "amount": "1500000",
                                    "decimals": 6,
                                    "uiAmountString": "1.5"
                                }
                            }
                        }
                    }
                }
            }]
        });

        let response: ContextResponse<Vec<KeyedTokenAccount>> =
            serde_json::from_value(value).unwrap();
        let accounts: Vec<TokenAccountInfo> = response
            .value
            .into_iter()
            .map(|k| k.into_account_info("Wallet1"))
            .collect();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].mint, "MintA");
        assert_eq!(accounts[0].raw_amount, "1500000");
        assert_eq!(accounts[0].decimals, 6);
        assert_eq!(accounts[0].state, TokenAccountState::Initialized);
    }

    #[test]
    fn test_parse_frozen_state() {
        let value = json!({
            "pubkey": "Acc1",
            "account": { "data": { "parsed": { "info": {
                "mint": "MintA",
                "state": "frozen",
                "tokenAmount": { "amount": "1", "decimals": 0 }
            }}}}
        });
        let keyed: KeyedTokenAccount = serde_json::from_value(value).unwrap();
        assert_eq!(
            keyed.into_account_info("W").state,
            TokenAccountState::Frozen
        );
    }

    #[test]
    fn test_parse_das_asset() {
        let value = json!({
            "id": "MintNft",
            "interface": "V1_NFT",
            "content": {
                "json_uri": "https://example.com/meta.json",
                "metadata": {
                    "name": "Ape #1",
                    "symbol": "APE",
                    "attributes": [{"trait_type": "hat", "value": "cap"}]
                },
                "links": { "image": "https://example.com/ape.png" }
            },
            "grouping": [
                { "group_key": "collection", "group_value": "CollectionMint" }
            ],
            "creators": [
                { "address": "Creator1", "verified": true }
            ],
            "supply": { "print_max_supply": 0, "print_current_supply": 0 }
        });

        let asset: DasAsset = serde_json::from_value(value).unwrap();
        assert_eq!(asset.name().as_deref(), Some("Ape #1"));
        assert_eq!(asset.symbol().as_deref(), Some("APE"));
        assert_eq!(asset.uri().as_deref(), Some("https://example.com/ape.png"));
        assert_eq!(asset.collection().as_deref(), Some("CollectionMint"));
        assert!(asset.has_verified_creator());
        assert!(asset.attributes().is_some());
    }

    #[test]
    fn test_parse_das_asset_minimal() {
        let asset: DasAsset = serde_json::from_value(json!({ "id": "MintX" })).unwrap();
        assert!(asset.name().is_none());
        assert!(asset.collection().is_none());
        assert!(!asset.has_verified_creator());
    }
}
