//! Response cache and the wrappers composed around outbound calls.
//!
//! [`cached`] and [`traced`] are plain higher-order functions: callers build the
//! stack explicitly, e.g. `cached(&cache, key, || traced("search", fetch(url)))`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::Instrument;

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// String-keyed cache whose entries expire after a TTL
pub struct TtlCache<T: Clone + Send + Sync> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone + Send + Sync> TtlCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Live value for `key`, if any
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        self.entries.write().insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        self.entries.write().remove(key).map(|entry| entry.value)
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

pub type SharedCache<T> = Arc<TtlCache<T>>;

pub fn create_cache<T: Clone + Send + Sync>(default_ttl: Duration) -> SharedCache<T> {
    Arc::new(TtlCache::new(default_ttl))
}

/// Return the cached value for `key` or run `compute` and cache a successful result.
///
/// Errors are passed through and never cached.
pub async fn cached<T, E, F, Fut>(cache: &TtlCache<T>, key: &str, compute: F) -> Result<T, E>
where
    T: Clone + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(hit) = cache.get(key) {
        tracing::trace!(key = %key, "Cache hit");
        return Ok(hit);
    }

    let value = compute().await?;

    // Misses are the only path that grows the cache, so expired entries go here
    let pruned = cache.cleanup_expired();
    if pruned > 0 {
        tracing::trace!(pruned = pruned, "Pruned expired cache entries");
    }
    cache.set(key, value.clone());
    Ok(value)
}

/// Run `fut` inside a span named after `operation` and log how long it took
pub async fn traced<T, Fut>(operation: &str, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let span = tracing::debug_span!("operation", name = %operation);
    let started = Instant::now();
    let output = fut.instrument(span).await;
    tracing::debug!(
        operation = %operation,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Operation finished"
    );
    output
}
