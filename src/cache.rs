//! Advisory in-process caches fronting the store
//!
//! The store is the single source of truth; every cache miss is resolved by
//! a store read that back-populates the cache. Entries expire by TTL and are
//! evicted lazily on read.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::Merchant;

pub const MERCHANT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const IDEMPOTENCY_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct TtlCache<V> {
    entries: DashMap<String, (V, Instant)>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, inserted_at) = entry.value();
                if inserted_at.elapsed() < self.ttl {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), (value, Instant::now()));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// The two cache families the orchestrator runs with
#[derive(Clone)]
pub struct Caches {
    /// `merchant:<apiKeyHash>` → merchant (≈ 1 h)
    pub merchants: Arc<TtlCache<Merchant>>,
    /// `idempotency:<merchantId>:<key>` → payment id (≈ 24 h)
    pub idempotency: Arc<TtlCache<Uuid>>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            merchants: Arc::new(TtlCache::new(MERCHANT_CACHE_TTL)),
            idempotency: Arc::new(TtlCache::new(IDEMPOTENCY_CACHE_TTL)),
        }
    }

    pub fn merchant_key(api_key_hash: &str) -> String {
        format!("merchant:{}", api_key_hash)
    }

    pub fn idempotency_key(merchant_id: Uuid, key: &str) -> String {
        format!("idempotency:{}:{}", merchant_id, key)
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_fresh_entry() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.put("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn expired_entry_is_evicted() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(0));
        cache.put("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.put("a", 1);
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn key_builders_match_layout() {
        let merchant_id = Uuid::nil();
        assert_eq!(
            Caches::idempotency_key(merchant_id, "idem-1"),
            format!("idempotency:{}:idem-1", merchant_id)
        );
        assert_eq!(Caches::merchant_key("abc123"), "merchant:abc123");
    }
}
