// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two-tier read/write-through cache.
//!
//! Tier 1 is an optional shared (distributed) cache; tier 2 is an always-on
//! process-local map. Reads try shared first under a short timeout, then
//! local, then report a miss so the caller goes to the store. Writes populate
//! both tiers. The cache is never the system of record: every entry is
//! reconstructible from the store, and invalidation is a hint to re-derive,
//! not a global consistency guarantee.
//!
//! Negative results ("not found") are never cached here: session creation is
//! implicit, and a stale cached negative would report a recently-created row
//! as missing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use charla_core::Clock;

use crate::shared::SharedCache;

/// One local-tier entry. Valid while `now - cached_at < ttl`.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

/// Two-tier TTL cache, generic over a serializable value type.
///
/// Composed into stores (one instance per entity type), never inherited.
/// All tiers are advisory: a caller that needs a just-written value must
/// bypass the cache rather than rely on invalidation propagation timing.
pub struct CacheLayer<V> {
    local: DashMap<String, CacheEntry<V>>,
    shared: Option<Arc<dyn SharedCache>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    shared_timeout: Duration,
}

impl<V> CacheLayer<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        clock: Arc<dyn Clock>,
        shared: Option<Arc<dyn SharedCache>>,
        ttl: Duration,
        shared_timeout: Duration,
    ) -> Self {
        Self {
            local: DashMap::new(),
            shared,
            clock,
            ttl,
            shared_timeout,
        }
    }

    /// Look up `key`, shared tier first, falling back to the local tier.
    ///
    /// Returns `None` on miss or expiry, forcing the caller to the store.
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.get_shared(key).await {
            // Refresh the local tier so a later shared-tier outage still
            // serves this entry until its TTL lapses.
            self.set_local(key, value.clone());
            return Some(value);
        }
        self.get_local(key)
    }

    /// Write `value` to both tiers. Shared-tier failures are non-fatal: the
    /// local tier is the durability-of-last-resort.
    pub async fn set(&self, key: &str, value: V) {
        self.set_local(key, value.clone());
        if let Some(shared) = &self.shared {
            match serde_json::to_string(&value) {
                Ok(json) => {
                    if let Err(e) = shared.set(key, json, self.ttl).await {
                        warn!(key, error = %e, "shared cache set failed; local tier only");
                    }
                }
                Err(e) => {
                    warn!(key, error = %e, "cache value serialization failed; local tier only");
                }
            }
        }
    }

    /// Drop `key` from both tiers.
    pub async fn invalidate(&self, key: &str) {
        self.local.remove(key);
        if let Some(shared) = &self.shared {
            if let Err(e) = shared.delete(key).await {
                warn!(key, error = %e, "shared cache invalidation failed");
            }
        }
    }

    /// Drop every key starting with `prefix` from both tiers.
    pub async fn invalidate_by_prefix(&self, prefix: &str) {
        self.local.retain(|k, _| !k.starts_with(prefix));
        if let Some(shared) = &self.shared {
            if let Err(e) = shared.delete_prefix(prefix).await {
                warn!(prefix, error = %e, "shared cache prefix invalidation failed");
            }
        }
    }

    /// Remove expired local entries. Returns the number evicted.
    ///
    /// Run on a fixed interval by the owning lifecycle; expired entries are
    /// also dropped lazily on read, so eviction only bounds memory.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.local.len();
        self.local.retain(|_, entry| self.is_valid(entry, now));
        let evicted = before - self.local.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired local cache entries");
        }
        evicted
    }

    /// Number of entries currently held in the local tier (expired included).
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    fn is_valid(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        match (now - entry.cached_at).to_std() {
            Ok(age) => age < self.ttl,
            // cached_at in the future (clock rewound): treat as expired.
            Err(_) => false,
        }
    }

    fn get_local(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        // The read guard must be released before removing, so the expired
        // branch is split out of the match.
        let hit = match self.local.get(key) {
            Some(entry) if self.is_valid(&entry, now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return None,
        };
        if hit.is_none() {
            self.local.remove(key);
        }
        hit
    }

    fn set_local(&self, key: &str, value: V) {
        self.local.insert(
            key.to_string(),
            CacheEntry {
                value,
                cached_at: self.clock.now(),
            },
        );
    }

    async fn get_shared(&self, key: &str) -> Option<V> {
        let shared = self.shared.as_ref()?;
        match tokio::time::timeout(self.shared_timeout, shared.get(key)).await {
            Ok(Ok(Some(json))) => match serde_json::from_str(&json) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "shared cache entry failed to deserialize; ignoring");
                    None
                }
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(key, error = %e, "shared cache read failed; falling back to local tier");
                None
            }
            Err(_) => {
                warn!(
                    key,
                    timeout_ms = self.shared_timeout.as_millis() as u64,
                    "shared cache read timed out; falling back to local tier"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use charla_core::CharlaError;
    use chrono::TimeZone;

    /// Clock whose reading is advanced by hand.
    struct TestClock(Mutex<DateTime<Utc>>);

    impl TestClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap(),
            )))
        }

        fn advance(&self, d: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::from_std(d).unwrap();
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Shared tier that always errors, to exercise degraded mode.
    struct BrokenShared;

    #[async_trait]
    impl SharedCache for BrokenShared {
        async fn get(&self, _key: &str) -> Result<Option<String>, CharlaError> {
            Err(CharlaError::Internal("shared tier down".into()))
        }

        async fn set(&self, _: &str, _: String, _: Duration) -> Result<(), CharlaError> {
            Err(CharlaError::Internal("shared tier down".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CharlaError> {
            Err(CharlaError::Internal("shared tier down".into()))
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<(), CharlaError> {
            Err(CharlaError::Internal("shared tier down".into()))
        }
    }

    fn layer(clock: Arc<TestClock>) -> CacheLayer<String> {
        CacheLayer::new(
            clock,
            None,
            Duration::from_secs(60),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = layer(TestClock::new());
        cache.set("session:+521234", "hola".to_string()).await;
        assert_eq!(
            cache.get("session:+521234").await,
            Some("hola".to_string())
        );
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = TestClock::new();
        let cache = layer(clock.clone());
        cache.set("k", "v".to_string()).await;

        clock.advance(Duration::from_secs(59));
        assert!(cache.get("k").await.is_some());

        clock.advance(Duration::from_secs(2));
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = layer(TestClock::new());
        cache.set("k", "v".to_string()).await;
        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_by_prefix_removes_matching_only() {
        let cache = layer(TestClock::new());
        cache.set("session:+521234", "a".to_string()).await;
        cache.set("session:+525678", "b".to_string()).await;
        cache.set("other:+521234", "c".to_string()).await;

        cache.invalidate_by_prefix("session:").await;

        assert!(cache.get("session:+521234").await.is_none());
        assert!(cache.get("session:+525678").await.is_none());
        assert_eq!(cache.get("other:+521234").await, Some("c".to_string()));
    }

    #[tokio::test]
    async fn evict_expired_drops_only_stale_entries() {
        let clock = TestClock::new();
        let cache = layer(clock.clone());
        cache.set("old", "v".to_string()).await;
        clock.advance(Duration::from_secs(61));
        cache.set("fresh", "v".to_string()).await;

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.local_len(), 1);
        assert!(cache.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn broken_shared_tier_degrades_to_local() {
        let cache = CacheLayer::new(
            TestClock::new(),
            Some(Arc::new(BrokenShared)),
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        // Set succeeds locally despite the shared-tier error.
        cache.set("k", "v".to_string()).await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
        // Invalidation still clears the local tier.
        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
    }
}
