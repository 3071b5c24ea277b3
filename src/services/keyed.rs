//! Keyed store of independently locked values.
//!
//! The outer map lock is only held long enough to find or create an entry; work on a
//! value happens under that value's own mutex, so distinct keys never contend.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

pub struct KeyedStore<K, V> {
    entries: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> Default for KeyedStore<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V> KeyedStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.entries.read().get(key).cloned()
    }

    /// Entry for `key`, creating it with `init` on first access.
    ///
    /// `init` runs at most once per key even when callers race.
    pub fn get_or_insert_with(&self, key: &K, init: impl FnOnce() -> V) -> Arc<Mutex<V>> {
        if let Some(existing) = self.get(key) {
            return existing;
        }

        let mut entries = self.entries.write();
        entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.write().insert(key, Arc::new(Mutex::new(value)));
    }

    pub fn remove(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.entries.write().remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> std::fmt::Debug for KeyedStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStore")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}
