//! Durable storage for learned rate limit profiles.
//!
//! Saving happens off the request path: the limiter hands snapshots to
//! [`profile_writer_task`] over a bounded channel and moves on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::LimitKey;
use super::profile::RateLimitProfile;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, key: &LimitKey) -> Result<Option<RateLimitProfile>>;

    async fn save(&self, key: &LimitKey, profile: &RateLimitProfile) -> Result<()>;
}

/// One JSON file per key inside a state directory
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    dir: PathBuf,
}

impl FileProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &LimitKey) -> PathBuf {
        let stem = sanitize_filename::sanitize(format!("{}__{}", key.host, key.class));
        self.dir.join(format!("{}.json", stem))
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn load(&self, key: &LimitKey) -> Result<Option<RateLimitProfile>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let profile: RateLimitProfile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid rate limit state in {}", path.display()))?;
        Ok(Some(profile.sanitized()))
    }

    async fn save(&self, key: &LimitKey, profile: &RateLimitProfile) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec(profile).context("Failed to serialize rate limit state")?;

        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Store that keeps profiles in memory, for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<LimitKey, RateLimitProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LimitKey) -> Option<RateLimitProfile> {
        self.profiles.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, key: &LimitKey) -> Result<Option<RateLimitProfile>> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &LimitKey, profile: &RateLimitProfile) -> Result<()> {
        self.profiles.write().insert(key.clone(), profile.clone());
        Ok(())
    }
}

pub(crate) type PersistRequest = (LimitKey, RateLimitProfile);

/// Background writer: keeps only the newest snapshot per key and flushes on a timer.
///
/// Exits after a final flush once every sender is dropped.
pub(crate) async fn profile_writer_task(
    mut rx: mpsc::Receiver<PersistRequest>,
    store: Arc<dyn ProfileStore>,
    flush_interval: Duration,
) {
    let mut pending: HashMap<LimitKey, RateLimitProfile> = HashMap::new();
    let mut interval = tokio::time::interval(flush_interval);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some((key, profile)) => {
                    pending.insert(key, profile);
                }
                None => {
                    flush(&*store, &mut pending).await;
                    break;
                }
            },
            _ = interval.tick() => {
                if !pending.is_empty() {
                    flush(&*store, &mut pending).await;
                }
            }
        }
    }

    tracing::debug!("Rate limit writer stopped");
}

async fn flush(store: &dyn ProfileStore, pending: &mut HashMap<LimitKey, RateLimitProfile>) {
    for (key, profile) in pending.drain() {
        if let Err(e) = store.save(&key, &profile).await {
            tracing::error!(key = %key, error = %e, "Failed to persist rate limit state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key() -> LimitKey {
        LimitKey::new("tracker.example.org", "search")
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());

        let mut profile = RateLimitProfile::new(2_000, 4);
        profile.record(1_000, 200, &HashMap::new());
        store.save(&key(), &profile).await.unwrap();

        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.limit(), 4);
        assert_eq!(loaded.window_ms(), 2_000);
        assert_eq!(loaded.history_len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path().join("nested"));
        assert!(store.load(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        std::fs::write(store.path_for(&key()), "{not json").unwrap();
        assert!(store.load(&key()).await.is_err());
    }

    #[test]
    fn test_path_is_sanitized() {
        let store = FileProfileStore::new("/state");
        let path = store.path_for(&LimitKey::new("evil/../host:443", "a/b"));
        assert_eq!(path.parent(), Some(Path::new("/state")));
    }

    #[tokio::test]
    async fn test_writer_keeps_latest_snapshot_and_flushes_on_close() {
        let store = Arc::new(MemoryProfileStore::new());
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(profile_writer_task(
            rx,
            store.clone(),
            Duration::from_secs(3600),
        ));

        tx.send((key(), RateLimitProfile::new(1_000, 3))).await.unwrap();
        tx.send((key(), RateLimitProfile::new(1_000, 9))).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key()).unwrap().limit(), 9);
    }
}
