//! # TTL Cache
//!
//! Small keyed cache with time-based staleness, shared by the prefix
//! registry and the branch directory.
//!
//! ```text
//!   get(key) ──► entry fresh?  ──yes──► value
//!                   │
//!                   no / missing ──► None (caller loads and puts)
//!
//!   invalidate(key) ──► removes the entry; next get misses
//! ```
//!
//! Entry ages come from the engine [`Clock`], not from `Instant`, so a
//! manual clock can age entries in tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.cached_at).to_std() {
            Ok(age) => age >= ttl,
            // Clock moved backwards past the entry; do not trust it.
            Err(_) => true,
        }
    }
}

/// Keyed cache whose entries expire `ttl` after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        TtlCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Fresh value for `key`, if any.
    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_stale(now, self.ttl))
            .map(|entry| entry.value.clone())
    }

    pub async fn put(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            cached_at: self.clock.now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Drops the entry for `key`. Returns whether one was cached.
    pub async fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.write().await.remove(key).is_some()
    }

    /// Number of entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn cache(clock: &ManualClock) -> TtlCache<String, i64> {
        TtlCache::new(Duration::from_secs(60), Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap());
        let cache = cache(&clock);

        cache.put("Purchase Order".to_string(), 1).await;
        assert_eq!(cache.get("Purchase Order").await, Some(1));

        clock.advance(chrono::Duration::seconds(59));
        assert_eq!(cache.get("Purchase Order").await, Some(1));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get("Purchase Order").await, None);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap());
        let cache = cache(&clock);

        cache.put("Stock Audit".to_string(), 7).await;
        assert!(cache.invalidate("Stock Audit").await);
        assert!(!cache.invalidate("Stock Audit").await);
        assert_eq!(cache.get("Stock Audit").await, None);
    }

    #[tokio::test]
    async fn test_clock_going_backwards_counts_as_stale() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap());
        let cache = cache(&clock);

        cache.put("Sales Order".to_string(), 3).await;
        clock.advance(chrono::Duration::seconds(-5));
        assert_eq!(cache.get("Sales Order").await, None);
    }
}
