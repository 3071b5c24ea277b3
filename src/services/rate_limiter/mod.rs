//! Adaptive rate limiting for upstream indexers
//!
//! Upstreams rarely publish their quotas, so each (host, limit class) gets a
//! [`RateLimitProfile`] that learns a window and request limit from the responses it
//! sees. Callers ask for a delay before a request and report the outcome afterwards.

mod headers;
mod persistence;
mod profile;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::services::keyed::KeyedStore;

pub use headers::is_rate_limited;
pub use persistence::{FileProfileStore, MemoryProfileStore, ProfileStore};
pub use profile::{
    MAX_LIMIT, MAX_WINDOW_MS, MIN_LIMIT, MIN_WINDOW_MS, Observation, RateLimitProfile,
    RateLimitStats,
};

use persistence::{PersistRequest, profile_writer_task};

const PERSIST_QUEUE: usize = 256;
const PERSIST_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Identity of an independently limited request stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LimitKey {
    pub host: String,
    pub class: String,
}

impl LimitKey {
    pub fn new(host: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            class: class.into(),
        }
    }

    pub fn for_url(url: &Url, class: impl Into<String>) -> Option<Self> {
        url.host_str().map(|host| Self::new(host, class))
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.host, self.class)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub initial_window_ms: i64,
    pub initial_limit: u32,
    /// Where learned profiles are kept between runs; `None` keeps them in memory only
    pub state_dir: Option<PathBuf>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            initial_window_ms: 1000,
            initial_limit: 10,
            state_dir: None,
        }
    }
}

/// Shared limiter owning every profile.
///
/// Profiles for different keys are locked independently.
pub struct AdaptiveRateLimiter {
    config: RateLimiterConfig,
    profiles: KeyedStore<LimitKey, RateLimitProfile>,
    store: Option<Arc<dyn ProfileStore>>,
    persist_tx: Option<mpsc::Sender<PersistRequest>>,
}

impl AdaptiveRateLimiter {
    /// Build a limiter from configuration, backed by a state directory when one is set
    pub fn new(config: RateLimiterConfig) -> Self {
        match config.state_dir.clone() {
            Some(dir) => Self::with_store(config, Arc::new(FileProfileStore::new(dir))),
            None => Self::memory_only(config),
        }
    }

    pub fn memory_only(config: RateLimiterConfig) -> Self {
        Self {
            config,
            profiles: KeyedStore::new(),
            store: None,
            persist_tx: None,
        }
    }

    /// Build a limiter that restores and saves profiles through `store`.
    ///
    /// Saving needs a tokio runtime; outside of one the limiter still restores
    /// profiles but never writes them back.
    pub fn with_store(config: RateLimiterConfig, store: Arc<dyn ProfileStore>) -> Self {
        let persist_tx = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = mpsc::channel(PERSIST_QUEUE);
                handle.spawn(profile_writer_task(rx, store.clone(), PERSIST_FLUSH_INTERVAL));
                Some(tx)
            }
            Err(_) => {
                tracing::warn!("No tokio runtime available, rate limit state will not be saved");
                None
            }
        };

        Self {
            config,
            profiles: KeyedStore::new(),
            store: Some(store),
            persist_tx,
        }
    }

    /// Recommended wait before the next request on `key`
    pub async fn throttle_delay(&self, key: &LimitKey) -> Duration {
        let profile = self.profile(key).await;
        let delay_ms = profile.lock().throttle_delay(now_ms());
        Duration::from_millis(delay_ms)
    }

    /// Sleep for the recommended delay, returning how long we waited
    pub async fn pace(&self, key: &LimitKey) -> Duration {
        let delay = self.throttle_delay(key).await;
        if !delay.is_zero() {
            tracing::debug!(key = %key, delay_ms = delay.as_millis() as u64, "Pacing request");
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Feed one upstream response into the estimate for `key`.
    ///
    /// Returns whether the response was classified as rate limited.
    pub async fn record_outcome(
        &self,
        key: &LimitKey,
        status: u16,
        headers: &HashMap<String, String>,
    ) -> bool {
        let profile = self.profile(key).await;

        let (rate_limited, snapshot) = {
            let mut guard = profile.lock();
            let rate_limited = guard.record(now_ms(), status, headers);
            let snapshot = self.persist_tx.as_ref().map(|_| guard.clone());
            (rate_limited, snapshot)
        };

        if rate_limited {
            tracing::debug!(key = %key, status = status, "Upstream rate limit detected");
        }

        if let (Some(tx), Some(snapshot)) = (&self.persist_tx, snapshot) {
            if let Err(e) = tx.try_send((key.clone(), snapshot)) {
                tracing::debug!(key = %key, error = %e, "Dropped rate limit state update");
            }
        }

        rate_limited
    }

    pub async fn stats(&self, key: &LimitKey) -> RateLimitStats {
        let profile = self.profile(key).await;
        profile.lock().stats(now_ms())
    }

    pub fn tracked_keys(&self) -> Vec<LimitKey> {
        self.profiles.keys()
    }

    async fn profile(&self, key: &LimitKey) -> Arc<Mutex<RateLimitProfile>> {
        if let Some(existing) = self.profiles.get(key) {
            return existing;
        }

        let restored = match &self.store {
            Some(store) => match store.load(key).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to restore rate limit state");
                    None
                }
            },
            None => None,
        };

        if restored.is_some() {
            tracing::debug!(key = %key, "Restored rate limit profile");
        }

        self.profiles.get_or_insert_with(key, || {
            restored.unwrap_or_else(|| {
                RateLimitProfile::new(self.config.initial_window_ms, self.config.initial_limit)
            })
        })
    }
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("config", &self.config)
            .field("profiles", &self.profiles.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LimitKey {
        LimitKey::new("Indexer.Example", "search")
    }

    #[test]
    fn test_limit_key_normalizes_host() {
        let url = Url::parse("https://Indexer.Example/api?q=1").unwrap();
        assert_eq!(LimitKey::for_url(&url, "search"), Some(key()));
        assert_eq!(key().to_string(), "indexer.example/search");
    }

    #[test]
    fn test_config_defaults() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.initial_window_ms, 1000);
        assert_eq!(config.initial_limit, 10);
        assert!(config.state_dir.is_none());
    }

    #[tokio::test]
    async fn test_profiles_are_created_lazily_per_key() {
        let limiter = AdaptiveRateLimiter::memory_only(RateLimiterConfig::default());
        assert!(limiter.tracked_keys().is_empty());

        assert_eq!(limiter.throttle_delay(&key()).await, Duration::ZERO);
        limiter
            .record_outcome(&LimitKey::new("other.example", "search"), 200, &HashMap::new())
            .await;

        assert_eq!(limiter.tracked_keys().len(), 2);
    }

    #[tokio::test]
    async fn test_keys_learn_independently() {
        let limiter = AdaptiveRateLimiter::memory_only(RateLimiterConfig::default());
        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-limit".to_string(), "3".to_string());

        assert!(!limiter.record_outcome(&key(), 200, &headers).await);
        assert!(
            limiter
                .record_outcome(&LimitKey::new("indexer.example", "download"), 429, &HashMap::new())
                .await
        );

        assert_eq!(limiter.stats(&key()).await.limit, 3);
        let download = limiter
            .stats(&LimitKey::new("indexer.example", "download"))
            .await;
        assert_eq!(download.limit, 10);
        assert_eq!(download.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_throttles_once_limit_reached() {
        let limiter = AdaptiveRateLimiter::memory_only(RateLimiterConfig {
            initial_window_ms: 60_000,
            initial_limit: 2,
            state_dir: None,
        });
        limiter.record_outcome(&key(), 200, &HashMap::new()).await;
        assert_eq!(limiter.throttle_delay(&key()).await, Duration::ZERO);
        limiter.record_outcome(&key(), 200, &HashMap::new()).await;
        assert!(limiter.throttle_delay(&key()).await > Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_state_is_persisted_and_restored() {
        let store = Arc::new(MemoryProfileStore::new());
        let limiter = AdaptiveRateLimiter::with_store(RateLimiterConfig::default(), store.clone());

        let mut headers = HashMap::new();
        headers.insert("ratelimit-limit".to_string(), "25".to_string());
        limiter.record_outcome(&key(), 200, &headers).await;

        tokio::time::sleep(PERSIST_FLUSH_INTERVAL * 3).await;
        assert_eq!(store.get(&key()).map(|p| p.limit()), Some(25));

        let restored = AdaptiveRateLimiter::with_store(RateLimiterConfig::default(), store.clone());
        assert_eq!(restored.stats(&key()).await.limit, 25);
    }

    #[tokio::test]
    async fn test_file_backed_limiter_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = RateLimiterConfig {
            state_dir: Some(dir.path().to_path_buf()),
            ..RateLimiterConfig::default()
        };

        let limiter = AdaptiveRateLimiter::new(config.clone());
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "12".to_string());
        limiter.record_outcome(&key(), 429, &headers).await;
        tokio::time::sleep(PERSIST_FLUSH_INTERVAL * 3).await;

        let restarted = AdaptiveRateLimiter::new(config);
        assert_eq!(restarted.stats(&key()).await.window_ms, 12_000);
    }

    #[test]
    fn test_construction_outside_runtime_still_restores() {
        let store = Arc::new(MemoryProfileStore::new());
        tokio_test::block_on(store.save(&key(), &RateLimitProfile::new(5_000, 4))).unwrap();

        let limiter = AdaptiveRateLimiter::with_store(RateLimiterConfig::default(), store);
        assert!(limiter.persist_tx.is_none());

        let stats = tokio_test::block_on(limiter.stats(&key()));
        assert_eq!((stats.window_ms, stats.limit), (5_000, 4));
    }
}
