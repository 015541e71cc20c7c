//! Per-key async mutexes
//!
//! Serializes mutations that share a key (a negotiation id, a client's
//! calendar day) inside one process. Entries hold only weak references, so a
//! key's mutex disappears once nobody is waiting on it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map of lazily created async mutexes keyed by `K`
pub struct KeyedLocks<K> {
    inner: Arc<Mutex<HashMap<K, Weak<AsyncMutex<()>>>>>,
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = self.mutex_for(key);
        mutex.lock_owned().await
    }

    fn mutex_for(&self, key: K) -> Arc<AsyncMutex<()>> {
        // A poisoned map only means another thread panicked between two
        // HashMap calls; the map itself is still usable.
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        map.retain(|_, weak| weak.strong_count() > 0);

        let mutex = Arc::new(AsyncMutex::new(()));
        map.insert(key, Arc::downgrade(&mutex));
        mutex
    }

    /// Number of keys currently held or awaited
    pub fn active_keys(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
