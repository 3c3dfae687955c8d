//! Slot-tagged TTL cache of wallet balances
//!
//! Keyed by `(wallet, mint)`; the native SOL entry sits under the wrapped
//! SOL mint so the key space stays uniform. Batches are written under a
//! single lock so readers never observe a mixed-slot view from one
//! discovery pass.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sol_types::TokenAmount;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// One observed balance, tagged with the slot it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub wallet: String,
    pub mint: String,
    pub amount: TokenAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_account: Option<String>,
    pub slot: u64,
    pub observed_at: DateTime<Utc>,
}

/// A snapshot plus its cache bookkeeping
#[derive(Debug, Clone)]
pub struct BalanceCacheEntry {
    pub snapshot: BalanceSnapshot,
    pub ttl: Duration,
    cached_at: Instant,
}

impl BalanceCacheEntry {
    pub fn age(&self) -> Duration {
        self.cached_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }
}

/// Cache occupancy counters
#[derive(Debug, Clone, Serialize)]
pub struct BalanceCacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
}

type BalanceKey = (String, String);

/// In-memory balance store with staleness-based invalidation
pub struct BalanceCache {
    entries: RwLock<HashMap<BalanceKey, BalanceCacheEntry>>,
    default_ttl: Duration,
}

impl BalanceCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Entry for one `(wallet, mint)` pair, if present and not expired
    pub fn get(&self, wallet: &str, mint: &str) -> Option<BalanceCacheEntry> {
        let entries = self.entries.read();
        entries
            .get(&(wallet.to_string(), mint.to_string()))
            .filter(|entry| !entry.is_expired())
            .cloned()
    }

    /// All non-expired entries for a wallet
    pub fn get_wallet_balances(&self, wallet: &str) -> Vec<BalanceCacheEntry> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|((w, _), entry)| w == wallet && !entry.is_expired())
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Atomic batch write: every snapshot becomes visible together, all
    /// stamped with the same insertion instant.
    pub fn save_balances(&self, snapshots: Vec<BalanceSnapshot>, ttl: Option<Duration>) {
        if snapshots.is_empty() {
            return;
        }
        let ttl = ttl.unwrap_or(self.default_ttl);
        let cached_at = Instant::now();

        let mut entries = self.entries.write();
        for snapshot in snapshots {
            let key = (snapshot.wallet.clone(), snapshot.mint.clone());
            entries.insert(
                key,
                BalanceCacheEntry {
                    snapshot,
                    ttl,
                    cached_at,
                },
            );
        }
    }

    /// Missing or older than `max_age`
    pub fn is_stale(&self, wallet: &str, mint: &str, max_age: Duration) -> bool {
        let entries = self.entries.read();
        match entries.get(&(wallet.to_string(), mint.to_string())) {
            Some(entry) => entry.age() > max_age,
            None => true,
        }
    }

    /// Drop every entry for a wallet
    pub fn invalidate_wallet(&self, wallet: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(w, _), _| w != wallet);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Invalidated {} balance entries for {}", removed, wallet);
        }
        removed
    }

    /// Periodic maintenance: drop entries older than `max_age`
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.age() <= max_age);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Pruned {} stale balance entries", removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> BalanceCacheStats {
        let entries = self.entries.read();
        let expired = entries.values().filter(|e| e.is_expired()).count();
        BalanceCacheStats {
            total_entries: entries.len(),
            expired_entries: expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sol_types::NATIVE_MINT;

    fn snapshot(wallet: &str, mint: &str, raw: u64, slot: u64) -> BalanceSnapshot {
        BalanceSnapshot {
            wallet: wallet.to_string(),
            mint: mint.to_string(),
            amount: TokenAmount::from_u64(raw, 9).unwrap(),
            token_account: None,
            slot,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_then_get_round_trip() {
        let cache = BalanceCache::new(Duration::from_secs(30));
        cache.save_balances(
            vec![
                snapshot("w1", NATIVE_MINT, 1_000_000_000, 5),
                snapshot("w1", "MintA", 42, 5),
                snapshot("w2", NATIVE_MINT, 7, 5),
            ],
            None,
        );

        let entries = cache.get_wallet_balances("w1");
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.snapshot.slot == 5));

        let native = cache.get("w1", NATIVE_MINT).unwrap();
        assert_eq!(native.snapshot.amount.raw_string(), "1000000000");
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let cache = BalanceCache::new(Duration::from_millis(20));
        cache.save_balances(vec![snapshot("w1", NATIVE_MINT, 1, 1)], None);
        assert!(cache.get("w1", NATIVE_MINT).is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("w1", NATIVE_MINT).is_none());
        assert!(cache.get_wallet_balances("w1").is_empty());
    }

    #[test]
    fn test_is_stale() {
        let cache = BalanceCache::new(Duration::from_secs(30));
        assert!(cache.is_stale("w1", NATIVE_MINT, Duration::from_secs(30)));

        cache.save_balances(vec![snapshot("w1", NATIVE_MINT, 1, 1)], None);
        assert!(!cache.is_stale("w1", NATIVE_MINT, Duration::from_secs(30)));

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.is_stale("w1", NATIVE_MINT, Duration::from_millis(10)));
    }

    #[test]
    fn test_invalidate_wallet() {
        let cache = BalanceCache::new(Duration::from_secs(30));
        cache.save_balances(
            vec![
                snapshot("w1", NATIVE_MINT, 1, 1),
                snapshot("w1", "MintA", 2, 1),
                snapshot("w2", NATIVE_MINT, 3, 1),
            ],
            None,
        );

        assert_eq!(cache.invalidate_wallet("w1"), 2);
        assert!(cache.get_wallet_balances("w1").is_empty());
        assert_eq!(cache.get_wallet_balances("w2").len(), 1);
    }

    #[test]
    fn test_prune_stale() {
        let cache = BalanceCache::new(Duration::from_secs(30));
        cache.save_balances(vec![snapshot("w1", NATIVE_MINT, 1, 1)], None);
        std::thread::sleep(Duration::from_millis(30));
        cache.save_balances(vec![snapshot("w2", NATIVE_MINT, 2, 2)], None);

        let removed = cache.prune_stale(Duration::from_millis(15));
        assert_eq!(removed, 1);
        assert!(cache.get("w1", NATIVE_MINT).is_none());
        assert!(cache.get("w2", NATIVE_MINT).is_some());
    }

    #[test]
    fn test_batch_overwrites_previous_entries() {
        let cache = BalanceCache::new(Duration::from_secs(30));
        cache.save_balances(vec![snapshot("w1", "MintA", 10, 1)], None);
        cache.save_balances(vec![snapshot("w1", "MintA", 20, 2)], None);

        let entry = cache.get("w1", "MintA").unwrap();
        assert_eq!(entry.snapshot.amount.raw_string(), "20");
        assert_eq!(entry.snapshot.slot, 2);
    }

    #[test]
    fn test_stats() {
        let cache = BalanceCache::new(Duration::from_millis(10));
        cache.save_balances(vec![snapshot("w1", NATIVE_MINT, 1, 1)], None);
        cache.save_balances(
            vec![snapshot("w2", NATIVE_MINT, 2, 1)],
            Some(Duration::from_secs(30)),
        );

        std::thread::sleep(Duration::from_millis(20));
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
    }
}
