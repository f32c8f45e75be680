//! Time-boxed memoization for outbound provider requests.
//!
//! At most one fresh value is kept per key per TTL window. Concurrent
//! misses for the same key may both reach the upstream; this is a
//! memoization cache, not a request-coalescing lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-memory TTL cache keyed by `"{provider}:{symbol}"` strings. Expired
/// entries are evicted lazily on `get` and proactively by a periodic sweep.
/// Process-lifetime scoped; nothing is persisted across restarts.
pub struct FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<V> FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with a background sweep firing every `sweep_interval`.
    pub fn new(sweep_interval: Duration) -> Self {
        let inner: Arc<Mutex<HashMap<String, CacheEntry<V>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let sweep_target = Arc::clone(&inner);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval yields immediately on the first tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut cache = sweep_target.lock().await;
                let before = cache.len();
                cache.retain(|_, entry| !entry.is_expired(now));
                let evicted = before - cache.len();
                if evicted > 0 {
                    debug!("Cache sweep evicted {} expired entries", evicted);
                }
            }
        });

        Self {
            inner,
            sweeper: std::sync::Mutex::new(Some(sweeper)),
        }
    }

    /// Creates a cache without a background sweep; expiry is lazy only.
    pub fn new_unswept() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            sweeper: std::sync::Mutex::new(None),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let mut cache = self.inner.lock().await;
        match cache.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                debug!("Cache entry expired for key: {}", key);
                cache.remove(key);
                None
            }
            Some(entry) => {
                debug!("Cache HIT for key: {}", key);
                Some(entry.value.clone())
            }
            None => {
                debug!("Cache MISS for key: {}", key);
                None
            }
        }
    }

    pub async fn put(&self, key: &str, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {}", key);
        cache.insert(key.to_string(), entry);
    }

    pub async fn invalidate(&self, key: &str) {
        let mut cache = self.inner.lock().await;
        cache.remove(key);
        debug!("Cache INVALIDATE for key: {}", key);
    }

    /// Stops the background sweep. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl<V> Drop for FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
