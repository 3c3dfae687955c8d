//! LRU cache of token metadata keyed by mint
//!
//! Bounded store with TTL on top of LRU ordering: overflow evicts the
//! least-recently-used record, expiry makes an entry behave like a miss.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use sol_types::AssetRecord;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default size bound
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedAsset {
    record: AssetRecord,
    cached_at: Instant,
}

/// Cache occupancy counters
#[derive(Debug, Clone, Serialize)]
pub struct AssetCacheStats {
    pub total_entries: usize,
    pub capacity: usize,
}

/// Bounded metadata store shared by the discovery services
pub struct AssetCache {
    entries: Mutex<LruCache<String, CachedAsset>>,
    ttl: Duration,
}

impl AssetCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Look up one mint; promotes the entry on hit
    pub fn find_by_mint(&self, mint: &str) -> Option<AssetRecord> {
        let mut entries = self.entries.lock();
        match entries.get(mint) {
            Some(cached) if cached.cached_at.elapsed() <= self.ttl => {
                Some(cached.record.clone())
            }
            Some(_) => {
                entries.pop(mint);
                None
            }
            None => None,
        }
    }

    /// Batch lookup; absent and expired mints are simply missing from the
    /// result
    pub fn find_by_mints(&self, mints: &[String]) -> HashMap<String, AssetRecord> {
        let mut found = HashMap::new();
        let mut entries = self.entries.lock();
        for mint in mints {
            match entries.get(mint) {
                Some(cached) if cached.cached_at.elapsed() <= self.ttl => {
                    found.insert(mint.clone(), cached.record.clone());
                }
                Some(_) => {
                    entries.pop(mint);
                }
                None => {}
            }
        }
        found
    }

    /// Insert or refresh one record
    pub fn save(&self, record: AssetRecord) {
        let mut entries = self.entries.lock();
        entries.put(
            record.mint.clone(),
            CachedAsset {
                record,
                cached_at: Instant::now(),
            },
        );
    }

    /// Insert or refresh a batch
    pub fn save_many(&self, records: Vec<AssetRecord>) {
        if records.is_empty() {
            return;
        }
        let count = records.len();
        let now = Instant::now();
        let mut entries = self.entries.lock();
        for record in records {
            entries.put(
                record.mint.clone(),
                CachedAsset {
                    record,
                    cached_at: now,
                },
            );
        }
        debug!("Cached {} asset records", count);
    }

    /// All non-expired records marked verified
    pub fn get_verified_assets(&self) -> Vec<AssetRecord> {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|(_, cached)| {
                cached.record.metadata.verified && cached.cached_at.elapsed() <= self.ttl
            })
            .map(|(_, cached)| cached.record.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> AssetCacheStats {
        let entries = self.entries.lock();
        AssetCacheStats {
            total_entries: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}
