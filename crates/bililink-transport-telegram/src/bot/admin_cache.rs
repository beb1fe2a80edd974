//! Chat administrator lookups
//!
//! Asking Telegram for a member's status on every admin command is slow and
//! counts against the API rate limit, so answers are kept for a short TTL.

use moka::future::Cache;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache of `(chat_id, user_id) -> is administrator`
#[derive(Clone)]
pub struct AdminCache {
    cache: Cache<(i64, i64), bool>,
}

impl AdminCache {
    /// Creates a cache whose entries expire after `ttl_secs`
    ///
    /// # Examples
    ///
    /// ```
    /// use bililink_transport_telegram::bot::AdminCache;
    ///
    /// let cache = AdminCache::new(300, 10_000);
    /// assert_eq!(cache.entry_count(), 0);
    /// ```
    #[must_use]
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { cache }
    }

    /// Whether `user_id` administers `chat_id`.
    ///
    /// `lookup` runs only on a miss. A failed lookup counts as "not an admin"
    /// and is not cached, so the next command asks again.
    pub async fn is_admin<F>(&self, chat_id: i64, user_id: i64, lookup: F) -> bool
    where
        F: Future<Output = anyhow::Result<bool>>,
    {
        let key = (chat_id, user_id);
        if let Some(known) = self.cache.get(&key).await {
            return known;
        }
        match lookup.await {
            Ok(admin) => {
                debug!(chat_id, user_id, admin, "Chat member status fetched");
                self.cache.insert(key, admin).await;
                admin
            }
            Err(e) => {
                warn!(chat_id, user_id, error = %e, "Chat member lookup failed");
                false
            }
        }
    }

    /// Returns the current number of entries in the cache
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn answers_are_cached_per_chat_and_user() {
        let cache = AdminCache::new(300, 100);
        let lookups = Arc::new(AtomicUsize::new(0));
        let lookup = |answer: bool| {
            let lookups = Arc::clone(&lookups);
            async move {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(answer)
            }
        };

        assert!(cache.is_admin(-100, 7, lookup(true)).await);
        assert!(cache.is_admin(-100, 7, lookup(false)).await);
        assert!(!cache.is_admin(-100, 8, lookup(false)).await);
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_lookup_is_retried() {
        let cache = AdminCache::new(300, 100);

        let denied = cache
            .is_admin(-5, 1, async { Err::<bool, _>(anyhow::anyhow!("chat not found")) })
            .await;
        assert!(!denied);

        assert!(cache.is_admin(-5, 1, async { Ok::<_, anyhow::Error>(true) }).await);
    }
}
