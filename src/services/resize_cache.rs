//! Bounded in-memory store of transformed images
//!
//! Entries are kept in least-recently-used order; `get` and `put` refresh an
//! entry, `contains` does not.

use bytes::Bytes;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::trace;

use crate::errors::{AppError, AppResult};
use crate::services::fingerprint::Fingerprint;

/// Capacity-limited LRU cache mapping fingerprints to encoded JPEG bytes
pub struct ResizeCache {
    entries: Mutex<LruCache<Fingerprint, Bytes>>,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResizeCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ResizeCache {
    /// Create an empty cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> AppResult<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| AppError::configuration("cache capacity must be at least 1"))?;

        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Whether an entry exists, without touching its recency
    pub async fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.lock().await.contains(key)
    }

    /// Look up an entry and mark it as most recently used
    pub async fn get(&self, key: &Fingerprint) -> Option<Bytes> {
        let found = self.entries.lock().await.get(key).cloned();

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        found
    }

    /// Insert or overwrite an entry, evicting the least recently used one when full
    pub async fn put(&self, key: Fingerprint, data: Bytes) {
        let evicted = self.entries.lock().await.push(key.clone(), data);

        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            trace!(fingerprint = %evicted_key, "Evicted cached image");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub async fn stats(&self) -> ResizeCacheStats {
        ResizeCacheStats {
            entries: self.len().await,
            capacity: self.capacity(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(n: u32) -> Fingerprint {
        Fingerprint::generate(n, n, &format!("http://example/{n}.jpeg"))
    }

    fn data(n: u32) -> Bytes {
        Bytes::from(format!("image-{n}"))
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(ResizeCache::new(0).is_err());
    }

    #[tokio::test]
    async fn test_put_get_and_contains() {
        let cache = ResizeCache::new(4).unwrap();

        assert!(!cache.contains(&key(1)).await);
        assert_eq!(cache.get(&key(1)).await, None);

        cache.put(key(1), data(1)).await;
        assert!(cache.contains(&key(1)).await);
        assert_eq!(cache.get(&key(1)).await, Some(data(1)));

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_key() {
        let cache = ResizeCache::new(2).unwrap();
        cache.put(key(1), data(1)).await;
        cache.put(key(1), data(9)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&key(1)).await, Some(data(9)));
    }

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let cache = ResizeCache::new(8).unwrap();
        for n in 0..100 {
            cache.put(key(n), data(n)).await;
            assert!(cache.len().await <= 8);
        }
        assert_eq!(cache.len().await, 8);
    }

    #[tokio::test]
    async fn test_refreshed_entries_survive_eviction() {
        let cache = ResizeCache::new(4).unwrap();
        for n in 0..4 {
            cache.put(key(n), data(n)).await;
        }

        // Refresh 0 and 1 so 2 and 3 become the least recently used
        assert!(cache.get(&key(0)).await.is_some());
        assert!(cache.get(&key(1)).await.is_some());

        cache.put(key(10), data(10)).await;
        cache.put(key(11), data(11)).await;

        assert!(cache.contains(&key(0)).await);
        assert!(cache.contains(&key(1)).await);
        assert!(!cache.contains(&key(2)).await);
        assert!(!cache.contains(&key(3)).await);
        assert!(cache.contains(&key(10)).await);
        assert!(cache.contains(&key(11)).await);
    }

    #[tokio::test]
    async fn test_contains_does_not_refresh() {
        let cache = ResizeCache::new(2).unwrap();
        cache.put(key(0), data(0)).await;
        cache.put(key(1), data(1)).await;

        assert!(cache.contains(&key(0)).await);
        cache.put(key(2), data(2)).await;

        assert!(!cache.contains(&key(0)).await);
        assert!(cache.contains(&key(1)).await);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let cache = Arc::new(ResizeCache::new(16).unwrap());

        let mut handles = Vec::new();
        for worker in 0..8u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..50u32 {
                    cache.put(key(n % 20), data(worker)).await;
                    let _ = cache.get(&key((n + worker) % 20)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 16);
    }
}
