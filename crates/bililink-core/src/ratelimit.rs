//! Fixed-window request limiter for the ambient link trigger
//!
//! Each conversation may have one link processed per window. Requests that
//! directly address the bot skip the limiter.

use crate::conversation::ConversationKey;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-conversation fixed-window limiter (one admission per window)
///
/// The window opens on the first admitted request and expires with the cache
/// entry's TTL, so state advances with wall-clock time without a sweeper.
#[derive(Clone)]
pub struct RateLimiter {
    /// Moka cache storing key -> () while the key's window is open
    windows: Cache<i64, ()>,
    window: Duration,
    /// Counter for dropped requests (for logging throttling)
    silenced_count: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a limiter with the given window length and key capacity
    #[must_use]
    pub fn new(window: Duration, max_capacity: u64) -> Self {
        let windows = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(window)
            .build();

        Self {
            windows,
            window,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Try to admit a request.
    ///
    /// Returns `true` when the request may be processed. `addressed` requests
    /// are always admitted and do not open a window.
    pub async fn admit(&self, key: ConversationKey, addressed: bool) -> bool {
        if addressed {
            return true;
        }

        // Insert-if-absent is a single atomic step per key
        let entry = self.windows.entry(key.as_i64()).or_insert(()).await;
        if entry.is_fresh() {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!(
                conversation = %key,
                silenced = count,
                "Rate limiter dropped ambient link requests"
            );
        }
        false
    }

    /// Total number of dropped requests
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }

    /// Configured window length
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_request_in_window_is_dropped() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 100);
        let key = ConversationKey::group(1);

        assert!(limiter.admit(key, false).await);
        assert!(!limiter.admit(key, false).await);
        assert_eq!(limiter.silenced_count(), 1);
    }

    #[tokio::test]
    async fn addressed_requests_bypass_window() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 100);
        let key = ConversationKey::private(7);

        assert!(limiter.admit(key, false).await);
        assert!(limiter.admit(key, true).await);
        assert!(limiter.admit(key, true).await);
        assert_eq!(limiter.silenced_count(), 0);
    }

    #[tokio::test]
    async fn conversations_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 100);

        assert!(limiter.admit(ConversationKey::group(1), false).await);
        assert!(limiter.admit(ConversationKey::group(2), false).await);
    }

    #[tokio::test]
    async fn window_reopens_after_expiry() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 100);
        let key = ConversationKey::group(3);

        assert!(limiter.admit(key, false).await);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.admit(key, false).await);
    }

    #[tokio::test]
    async fn simultaneous_requests_admit_exactly_one() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 100);
        let key = ConversationKey::group(4);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.admit(key, false).await }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.expect("task panicked") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
