//! Per-key async mutual exclusion.
//!
//! Used to serialize read-modify-write cycles on a conversation's config word
//! and to make concurrent downloads of the same clip share one transcode.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// A set of async locks addressed by key. Idle entries are pruned on access.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    inner: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Create an empty lock set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. The guard releases it on drop.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            // Only the map holds an idle slot
            map.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(map.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of keys currently held or awaited
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner
            .lock()
            .map(|map| map.values().filter(|s| Arc::strong_count(s) > 1).count())
            .unwrap_or(0)
    }
}
