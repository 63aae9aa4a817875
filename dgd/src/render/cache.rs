//! Keyed render cache with FIFO eviction and TTL expiry

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::session::{Clock, SystemClock};

use super::types::{RenderArtifact, RenderOptions};

struct CacheEntry {
    artifact: RenderArtifact,
    inserted_at: i64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

/// Cache of finished render artifacts
///
/// Entries are keyed by source and every option that affects the
/// output. Expiry is checked on read, a stale hit counts as a miss.
pub struct RenderCache {
    capacity: usize,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner>,
}

impl RenderCache {
    pub fn new(capacity: usize, ttl_ms: i64) -> Self {
        Self::with_clock(capacity, ttl_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            ttl_ms,
            clock,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Cache key for a source under the given options
    pub fn key(source: &str, options: &RenderOptions) -> String {
        let material = format!(
            "{}:{}:{}:{}x{}",
            source, options.theme, options.format, options.width, options.height
        );
        hex::encode(Sha256::digest(material.as_bytes()))
    }

    /// Look up a cached artifact, dropping it if its TTL has passed
    pub async fn get(&self, key: &str) -> Option<RenderArtifact> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;

        let expired = match inner.entries.get(key) {
            Some(entry) => now - entry.inserted_at >= self.ttl_ms,
            None => return None,
        };

        if expired {
            debug!(key, "RenderCache::get: entry expired");
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        inner.entries.get(key).map(|entry| entry.artifact.clone())
    }

    /// Insert an artifact, evicting the oldest entries at capacity
    pub async fn put(&self, key: String, artifact: RenderArtifact) {
        if self.capacity == 0 {
            return;
        }

        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.artifact = artifact;
            entry.inserted_at = now;
            return;
        }

        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    debug!(key = %oldest, "RenderCache::put: evicting oldest entry");
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, CacheEntry { artifact, inserted_at: now });
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{RenderFormat, RenderPayload};
    use super::*;
    use crate::session::MockClock;

    fn artifact(tag: &str) -> RenderArtifact {
        RenderArtifact {
            format: RenderFormat::Svg,
            payload: RenderPayload::Bytes(tag.as_bytes().to_vec()),
            cached: false,
            elapsed_ms: 5,
        }
    }

    #[test]
    fn test_key_covers_source_and_options() {
        let options = RenderOptions::default();
        let base = RenderCache::key("flowchart TD\n  A --> B", &options);

        assert_eq!(RenderCache::key("flowchart TD\n  A --> B", &options), base);
        assert_ne!(RenderCache::key("flowchart TD\n  A --> C", &options), base);

        let dark = RenderOptions {
            theme: "dark".to_string(),
            ..RenderOptions::default()
        };
        assert_ne!(RenderCache::key("flowchart TD\n  A --> B", &dark), base);

        let wide = RenderOptions {
            width: 1920,
            ..RenderOptions::default()
        };
        assert_ne!(RenderCache::key("flowchart TD\n  A --> B", &wide), base);
    }

    #[tokio::test]
    async fn test_get_and_put() {
        let cache = RenderCache::new(10, 60_000);

        assert!(cache.get("k1").await.is_none());

        cache.put("k1".to_string(), artifact("one")).await;
        let hit = cache.get("k1").await.unwrap();
        assert_eq!(hit.payload, RenderPayload::Bytes(b"one".to_vec()));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped() {
        let clock = Arc::new(MockClock::new(1_000));
        let cache = RenderCache::with_clock(10, 5_000, clock.clone());

        cache.put("k1".to_string(), artifact("one")).await;

        clock.advance(4_999);
        assert!(cache.get("k1").await.is_some());

        clock.advance(1);
        assert!(cache.get("k1").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_fifo_eviction_at_capacity() {
        let cache = RenderCache::new(2, 60_000);

        cache.put("k1".to_string(), artifact("one")).await;
        cache.put("k2".to_string(), artifact("two")).await;
        cache.put("k3".to_string(), artifact("three")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("k1").await.is_none());
        assert!(cache.get("k2").await.is_some());
        assert!(cache.get("k3").await.is_some());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_key_without_eviction() {
        let cache = RenderCache::new(2, 60_000);

        cache.put("k1".to_string(), artifact("one")).await;
        cache.put("k2".to_string(), artifact("two")).await;
        cache.put("k1".to_string(), artifact("fresh")).await;

        assert_eq!(cache.len().await, 2);
        let hit = cache.get("k1").await.unwrap();
        assert_eq!(hit.payload, RenderPayload::Bytes(b"fresh".to_vec()));
        assert!(cache.get("k2").await.is_some());
    }

    #[tokio::test]
    async fn test_zero_capacity_caches_nothing() {
        let cache = RenderCache::new(0, 60_000);
        cache.put("k1".to_string(), artifact("one")).await;
        assert!(cache.get("k1").await.is_none());
    }
}
