//! End-to-end discovery scenarios against mock RPC nodes

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sol_portfolio::{
    AssetCache, BalanceCache, BalanceDiscoveryConfig, BalanceDiscoveryService, DiscoveryOptions,
    DiscoveryPhase, FetchOptions, IntegrationConfig, ProgressListeners, RpcReader, SolIntegration,
};
use sol_rpc::{Capability, ChainConfig, EndpointConfig, FallbackChain, RpcRequest, RpcTransport};
use sol_types::{AssetKind, DomainError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Well-known 32-byte base58 addresses usable as wallets in tests
const WALLET: &str = "11111111111111111111111111111111";
const WALLET_2: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

type Handler = Box<dyn Fn(&str, &RpcRequest) -> Result<Value, DomainError> + Send + Sync>;

/// Transport that answers from a closure and records every call
struct MockTransport {
    handler: Handler,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    fn new(handler: impl Fn(&str, &RpcRequest) -> Result<Value, DomainError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(_, m)| m == method).count()
    }

    fn count_url(&self, url_part: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(u, _)| u.contains(url_part))
            .count()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(
        &self,
        url: &str,
        request: &RpcRequest,
        _timeout: Duration,
    ) -> Result<Value, DomainError> {
        self.calls
            .lock()
            .push((url.to_string(), request.method.clone()));
        (self.handler)(url, request)
    }
}

fn endpoint(name: &str, priority: u32) -> EndpointConfig {
    EndpointConfig::new(name, format!("http://{}.test", name), priority)
        .with_capabilities([Capability::Standard, Capability::Das])
}

fn balance_response(lamports: u64, slot: u64) -> Value {
    json!({ "context": { "slot": slot }, "value": lamports })
}

fn token_account(pubkey: &str, mint: &str, amount: &str, decimals: u8, state: &str) -> Value {
    json!({
        "pubkey": pubkey,
        "account": { "data": { "parsed": { "info": {
            "mint": mint,
            "owner": WALLET,
            "state": state,
            "tokenAmount": { "amount": amount, "decimals": decimals }
        }}}}
    })
}

fn accounts_response(accounts: Vec<Value>, slot: u64) -> Value {
    json!({ "context": { "slot": slot }, "value": accounts })
}

fn das_batch(request: &RpcRequest, assets: &HashMap<String, Value>) -> Value {
    let ids = request.params[0]["ids"].as_array().cloned().unwrap_or_default();
    Value::Array(
        ids.iter()
            .map(|id| {
                assets
                    .get(id.as_str().unwrap_or_default())
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect(),
    )
}

fn usdc_asset() -> Value {
    json!({
        "id": "MintUsdc",
        "interface": "FungibleToken",
        "content": { "metadata": { "name": "USD Coin", "symbol": "USDC" } },
        "token_info": { "decimals": 6, "supply": 1_000_000_000u64 },
        "creators": [{ "address": "Circle", "verified": true }]
    })
}

fn ape_asset() -> Value {
    json!({
        "id": "MintApe",
        "interface": "V1_NFT",
        "content": {
            "json_uri": "https://example.com/ape.json",
            "metadata": { "name": "Ape #1", "symbol": "APE" },
            "links": { "image": "https://example.com/ape.png" }
        },
        "grouping": [{ "group_key": "collection", "group_value": "ApeCollection" }],
        "token_info": { "decimals": 0, "supply": 1 }
    })
}

/// Handler for a well-behaved node holding one USDC account and one NFT
fn standard_node() -> Handler {
    let das: HashMap<String, Value> = [
        ("MintUsdc".to_string(), usdc_asset()),
        ("MintApe".to_string(), ape_asset()),
    ]
    .into();

    Box::new(move |_url, request| match request.method.as_str() {
        "getBalance" => Ok(balance_response(1_000_000_000, 42)),
        "getTokenAccountsByOwner" => Ok(accounts_response(
            vec![
                token_account("AccUsdc", "MintUsdc", "5000000", 6, "initialized"),
                token_account("AccApe", "MintApe", "1", 0, "initialized"),
            ],
            42,
        )),
        "getSlot" => Ok(json!(42u64)),
        "getAssetBatch" => Ok(das_batch(request, &das)),
        "getAsset" => {
            let id = request.params[0]["id"].as_str().unwrap_or_default();
            Ok(das.get(id).cloned().unwrap_or(Value::Null))
        }
        other => Err(DomainError::network_fatal(format!("unexpected method {}", other))),
    })
}

fn client_config(cache_ttl: Duration) -> IntegrationConfig {
    IntegrationConfig {
        rpc_endpoints: vec![endpoint("e1", 1), endpoint("e2", 2)],
        cache_ttl,
        retry_base_delay: Duration::from_millis(10),
        ..IntegrationConfig::default()
    }
}

/// Direct service wiring for tests that need to reach into the caches
fn balance_service(
    transport: Arc<MockTransport>,
    cache_ttl: Duration,
) -> (BalanceDiscoveryService, Arc<BalanceCache>, Arc<AssetCache>) {
    let chain = Arc::new(
        FallbackChain::new(
            vec![endpoint("e1", 1)],
            ChainConfig::default(),
            transport,
        )
        .unwrap(),
    );
    let cache = Arc::new(BalanceCache::new(cache_ttl));
    let assets = Arc::new(AssetCache::with_defaults());
    let service = BalanceDiscoveryService::new(
        RpcReader::new(chain),
        cache.clone(),
        assets.clone(),
        BalanceDiscoveryConfig {
            retry_base_delay: Duration::from_millis(10),
            ..BalanceDiscoveryConfig::default()
        },
        Arc::new(ProgressListeners::new()),
    );
    (service, cache, assets)
}

#[tokio::test]
async fn happy_path_empty_wallet() {
    let transport = MockTransport::new(|_url, request| match request.method.as_str() {
        "getBalance" => Ok(balance_response(1_000_000_000, 7)),
        "getTokenAccountsByOwner" => Ok(accounts_response(vec![], 7)),
        "getSlot" => Ok(json!(7u64)),
        other => Err(DomainError::network_fatal(format!("unexpected {}", other))),
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport.clone())
            .unwrap();

    let balance = client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(balance.native_balance.raw_string(), "1000000000");
    assert_eq!(balance.native_balance.decimals(), 9);
    assert!(balance.token_balances.is_empty());
    assert_eq!(balance.total_accounts, 1);
    assert!(!balance.from_cache);

    // Everything was served by the preferred endpoint
    assert_eq!(transport.count_url("e2"), 0);

    let metrics = client.get_metrics();
    assert_eq!(metrics.total_requests, metrics.successful_requests);
    assert_eq!(metrics.fallbacks_triggered, 0);
}

#[tokio::test]
async fn http_503_falls_back_to_secondary() {
    let transport = MockTransport::new(|url, request| {
        if url.contains("e1") && request.method == "getBalance" {
            return Err(DomainError::Network {
                message: "HTTP 503".to_string(),
                retryable: true,
            });
        }
        match request.method.as_str() {
            "getBalance" => Ok(balance_response(2_000_000_000, 7)),
            "getTokenAccountsByOwner" => Ok(accounts_response(vec![], 7)),
            "getSlot" => Ok(json!(7u64)),
            other => Err(DomainError::network_fatal(format!("unexpected {}", other))),
        }
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport.clone())
            .unwrap();

    let balance = client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(balance.native_balance.raw_string(), "2000000000");

    let metrics = client.get_metrics();
    assert_eq!(metrics.fallbacks_triggered, 1);

    // The failed getBalance is on e1's ledger; the later reads that e1
    // served fine are too
    let e1 = metrics.endpoints.iter().find(|e| e.name == "e1").unwrap();
    assert_eq!(e1.failures, 1);
    assert_eq!(e1.successes, 2);
}

#[tokio::test]
async fn cache_hit_within_ttl_then_stale_refetch() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_millis(80)), transport.clone())
            .unwrap();

    let first = client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(transport.count("getBalance"), 1);

    // Second read inside the TTL is served from cache, byte-equal modulo
    // the cache flag
    let second = client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(second.native_balance, first.native_balance);
    assert_eq!(second.token_balances, first.token_balances);
    assert_eq!(second.last_updated, first.last_updated);
    assert_eq!(transport.count("getBalance"), 1);

    // Past the TTL the whole view is rejected and refetched
    tokio::time::sleep(Duration::from_millis(120)).await;
    let third = client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    assert!(!third.from_cache);
    assert!(third.last_updated > first.last_updated);
    assert_eq!(transport.count("getBalance"), 2);
}

#[tokio::test]
async fn force_refresh_bypasses_cache() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport.clone())
            .unwrap();

    client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();

    let refreshed = client
        .fetch_wallet_balance(
            WALLET,
            &FetchOptions {
                force_refresh: true,
                ..FetchOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(transport.count("getBalance"), 2);
}

#[tokio::test]
async fn invalidate_wallet_forces_refetch() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport.clone())
            .unwrap();

    client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    let removed = client.invalidate_wallet(WALLET);
    assert!(removed >= 1);

    let balance = client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    assert!(!balance.from_cache);
    assert_eq!(transport.count("getBalance"), 2);
}

#[tokio::test]
async fn missing_native_entry_rejects_cached_view() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });
    let (service, cache, _assets) = balance_service(transport.clone(), Duration::from_secs(30));

    // Seed the cache with a token entry but no native entry
    cache.save_balances(
        vec![sol_portfolio::BalanceSnapshot {
            wallet: WALLET.to_string(),
            mint: "MintUsdc".to_string(),
            amount: sol_types::TokenAmount::from_u64(1, 6).unwrap(),
            token_account: None,
            slot: 1,
            observed_at: chrono::Utc::now(),
        }],
        None,
    );

    let balance = service
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    assert!(!balance.from_cache);
    assert_eq!(transport.count("getBalance"), 1);
}

#[tokio::test]
async fn frozen_and_zero_accounts_are_filtered() {
    let transport = MockTransport::new(|_url, request| match request.method.as_str() {
        "getBalance" => Ok(balance_response(10, 7)),
        "getTokenAccountsByOwner" => Ok(accounts_response(
            vec![
                token_account("AccA", "MintA", "100", 6, "initialized"),
                token_account("AccB", "MintB", "0", 6, "initialized"),
                token_account("AccC", "MintC", "50", 6, "frozen"),
            ],
            7,
        )),
        "getSlot" => Ok(json!(7u64)),
        other => Err(DomainError::network_fatal(format!("unexpected {}", other))),
    });

    let (service, _cache, _assets) = balance_service(transport.clone(), Duration::from_secs(30));

    let balance = service
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(balance.token_balances.len(), 1);
    assert_eq!(balance.token_balances[0].mint, "MintA");
    assert_eq!(balance.total_accounts, 2);

    // Zero balances come back when asked for; frozen never does
    let with_zero = service
        .fetch_wallet_balance(
            WALLET,
            &FetchOptions {
                force_refresh: true,
                include_zero_balances: true,
                ..FetchOptions::default()
            },
        )
        .await
        .unwrap();
    let mints: Vec<&str> = with_zero
        .token_balances
        .iter()
        .map(|t| t.mint.as_str())
        .collect();
    assert!(mints.contains(&"MintA"));
    assert!(mints.contains(&"MintB"));
    assert!(!mints.contains(&"MintC"));
}

#[tokio::test]
async fn known_nfts_are_skipped_unless_requested() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });
    let (service, _cache, assets) = balance_service(transport, Duration::from_secs(30));

    // Teach the asset cache that MintApe is an NFT
    assets.save(sol_types::AssetRecord::nft(
        "MintApe",
        sol_types::TokenMetadata::unknown(0),
        Some(1),
    ));

    let without_nfts = service
        .fetch_wallet_balance(
            WALLET,
            &FetchOptions {
                include_nfts: false,
                ..FetchOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(without_nfts.token_balances.len(), 1);
    assert_eq!(without_nfts.token_balances[0].mint, "MintUsdc");

    let with_nfts = service
        .fetch_wallet_balance(
            WALLET,
            &FetchOptions {
                force_refresh: true,
                ..FetchOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(with_nfts.token_balances.len(), 2);
}

#[tokio::test]
async fn retryable_failures_back_off_and_recover() {
    let remaining_failures = Arc::new(Mutex::new(2u32));
    let transport = MockTransport::new({
        let remaining = remaining_failures.clone();
        move |_url, request| match request.method.as_str() {
            "getBalance" => {
                let mut left = remaining.lock();
                if *left > 0 {
                    *left -= 1;
                    Err(DomainError::network_retryable("connection reset"))
                } else {
                    Ok(balance_response(55, 7))
                }
            }
            "getTokenAccountsByOwner" => Ok(accounts_response(vec![], 7)),
            "getSlot" => Ok(json!(7u64)),
            other => Err(DomainError::network_fatal(format!("unexpected {}", other))),
        }
    });

    let (service, _cache, _assets) = balance_service(transport.clone(), Duration::from_secs(30));

    let balance = service
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(balance.native_balance.raw_string(), "55");
    assert_eq!(transport.count("getBalance"), 3);
}

#[tokio::test]
async fn non_retryable_failure_surfaces_immediately() {
    let transport = MockTransport::new(|_url, request| match request.method.as_str() {
        "getBalance" => Err(DomainError::network_fatal("RPC error -32602: Invalid params")),
        other => Err(DomainError::network_fatal(format!("unexpected {}", other))),
    });

    let (service, _cache, _assets) = balance_service(transport.clone(), Duration::from_secs(30));

    let result = service
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(DomainError::Network { retryable: false, .. })
    ));
    assert_eq!(transport.count("getBalance"), 1);
}

#[tokio::test]
async fn invalid_address_is_rejected_locally() {
    let transport = MockTransport::new(|_url, _request| {
        panic!("no RPC call should be made for an invalid address")
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    let result = client
        .fetch_wallet_balance("not-a-wallet-0OIl", &FetchOptions::default())
        .await;
    assert!(matches!(result, Err(DomainError::InvalidAddress(_))));
}

#[tokio::test]
async fn discovery_classifies_tokens_and_nfts() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    let result = client
        .discover_tokens(WALLET, &DiscoveryOptions::default())
        .await
        .unwrap();

    assert_eq!(result.processed_count, 2);
    assert_eq!(result.tokens.len(), 1);
    assert_eq!(result.nfts.len(), 1);
    assert!(result.errors.is_empty());

    assert_eq!(result.tokens[0].mint, "MintUsdc");
    assert_eq!(result.tokens[0].metadata.symbol, "USDC");
    assert!(result.tokens[0].metadata.verified);

    assert_eq!(result.nfts[0].mint, "MintApe");
    assert_eq!(result.nfts[0].kind, AssetKind::Nft);
    assert_eq!(result.nfts[0].collection.as_deref(), Some("ApeCollection"));

    // Discovery fed the asset cache
    let cached = client.get_asset("MintApe").unwrap();
    assert!(cached.is_nft());
}

#[tokio::test]
async fn metadata_batch_failure_is_per_mint_not_fatal() {
    let transport = MockTransport::new(|_url, request| match request.method.as_str() {
        "getBalance" => Ok(balance_response(10, 7)),
        "getTokenAccountsByOwner" => Ok(accounts_response(
            vec![
                token_account("AccA", "MintA", "100", 6, "initialized"),
                token_account("AccB", "MintB", "200", 6, "initialized"),
            ],
            7,
        )),
        "getSlot" => Ok(json!(7u64)),
        // The DAS provider is down for this test
        "getAssetBatch" | "getAsset" => Err(DomainError::network_fatal("DAS unavailable")),
        other => Err(DomainError::network_fatal(format!("unexpected {}", other))),
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    let result = client
        .discover_tokens(WALLET, &DiscoveryOptions::default())
        .await
        .unwrap();

    // Both mints are reported, with placeholder metadata and an error each
    assert_eq!(result.processed_count, 2);
    assert_eq!(result.tokens.len(), 2);
    assert!(result.tokens.iter().all(|t| t.metadata.symbol == "UNKNOWN"));
    assert!(result.errors.len() >= 2);
}

#[tokio::test]
async fn discovery_without_das_endpoint_degrades() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    // Standard-only endpoint: token accounts resolve, metadata cannot
    let config = IntegrationConfig {
        rpc_endpoints: vec![EndpointConfig::new("plain", "http://plain.test", 1)],
        retry_base_delay: Duration::from_millis(10),
        ..IntegrationConfig::default()
    };
    let client = SolIntegration::with_transport(config, transport).unwrap();

    let result = client
        .discover_tokens(WALLET, &DiscoveryOptions::default())
        .await
        .unwrap();

    assert_eq!(result.processed_count, 2);
    assert!(!result.errors.is_empty());
    assert!(result
        .errors
        .iter()
        .any(|issue| issue.error.contains("No eligible endpoint")));
}

#[tokio::test]
async fn refresh_token_metadata_upserts() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    let refreshed = client
        .refresh_token_metadata(&["MintUsdc".to_string(), "MintGone".to_string()])
        .await
        .unwrap();
    assert_eq!(refreshed, 1);
    assert_eq!(client.get_asset("MintUsdc").unwrap().metadata.symbol, "USDC");
    assert!(matches!(
        client.get_asset("MintGone"),
        Err(DomainError::AssetNotFound { .. })
    ));
}

#[tokio::test]
async fn portfolio_snapshot_joins_balances_and_metadata() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    let snapshot = client
        .get_portfolio(WALLET, &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(snapshot.address, WALLET);
    assert_eq!(snapshot.sol_balance.raw_string(), "1000000000");
    assert_eq!(snapshot.token_count, 1);
    assert_eq!(snapshot.nft_count, 1);
    assert_eq!(snapshot.tokens[0].symbol, "USDC");
    assert_eq!(snapshot.nfts[0].name, "Ape #1");
    assert_eq!(snapshot.total_value_usd, None);
    assert!(snapshot.tokens[0].value_usd.is_none());
}

#[tokio::test]
async fn batch_fetch_preserves_order_and_isolates_failures() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    let wallets = vec![
        WALLET.to_string(),
        "definitely-not-base58-0OIl".to_string(),
        WALLET_2.to_string(),
    ];
    let results = client
        .fetch_multiple_wallet_balances(&wallets, &FetchOptions::default())
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().wallet, WALLET);
    assert!(matches!(
        results[1],
        Err(DomainError::InvalidAddress(_))
    ));
    assert_eq!(results[2].as_ref().unwrap().wallet, WALLET_2);
}

#[tokio::test]
async fn progress_events_cover_the_run() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    let events: Arc<Mutex<Vec<(DiscoveryPhase, u8)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let events = events.clone();
        client.on_progress(move |event| {
            events.lock().push((event.phase, event.percent));
        });
    }

    client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await
        .unwrap();

    let events = events.lock();
    assert!(!events.is_empty());
    assert_eq!(events.first().unwrap(), &(DiscoveryPhase::CacheCheck, 10));
    assert_eq!(events.last().unwrap(), &(DiscoveryPhase::Complete, 100));
    assert!(events.iter().any(|(p, _)| *p == DiscoveryPhase::FetchNative));
    assert!(events.iter().any(|(p, _)| *p == DiscoveryPhase::Persist));
}

#[tokio::test]
async fn shutdown_makes_the_client_inert() {
    let transport = MockTransport::new({
        let handler = standard_node();
        move |url, request| handler(url, request)
    });

    let client =
        SolIntegration::with_transport(client_config(Duration::from_secs(30)), transport).unwrap();

    client.shutdown();
    let result = client
        .fetch_wallet_balance(WALLET, &FetchOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(DomainError::NoEligibleEndpoint { .. })
    ));
}
