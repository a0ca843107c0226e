//! Unauthorized access flood protection
//!
//! When an allow-list is configured, strangers get "Access denied" at most
//! once per cooldown so the bot is not rate-limited by Telegram for
//! answering spam.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Tracks when each unauthorized user was last told "Access denied".
///
/// Every attempt is still counted; only the reply is throttled.
#[derive(Clone)]
pub struct UnauthorizedCache {
    /// user_id -> () with a time-to-live equal to the cooldown
    cache: Cache<i64, ()>,
    cooldown: Duration,
    silenced_count: Arc<AtomicU64>,
}

impl UnauthorizedCache {
    /// Create a cache.
    ///
    /// Entries expire after `cooldown_secs` (or `ttl_secs` if shorter) so the
    /// next attempt after the cooldown gets a reply again.
    ///
    /// # Examples
    ///
    /// ```
    /// use tubegrab_bot::bot::UnauthorizedCache;
    ///
    /// let cache = UnauthorizedCache::new(1200, 7200, 10_000);
    /// assert_eq!(cache.cooldown().as_secs(), 1200);
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(cooldown_secs.min(ttl_secs)))
            .build();

        Self {
            cache,
            cooldown: Duration::from_secs(cooldown_secs),
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether "Access denied" should be sent to `user_id` now.
    ///
    /// Only every 100th silenced attempt is logged.
    pub async fn should_send(&self, user_id: i64, user_name: &str) -> bool {
        if self.cache.get(&user_id).await.is_none() {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!(
                "⛔️ Silenced {} unauthorized attempts (recent: user {} - {})",
                count, user_id, user_name
            );
        }

        false
    }

    /// Start the cooldown for `user_id` after a reply was delivered
    pub async fn mark_sent(&self, user_id: i64) {
        self.cache.insert(user_id, ()).await;
    }

    /// Users currently in cooldown
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Attempts that got no reply
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }

    /// Configured cooldown
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_attempt_should_send() {
        let cache = UnauthorizedCache::new(60, 120, 100);
        assert!(cache.should_send(12345, "TestUser").await);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_attempt() {
        let cache = UnauthorizedCache::new(60, 120, 100);

        assert!(cache.should_send(12345, "TestUser").await);
        cache.mark_sent(12345).await;

        assert!(!cache.should_send(12345, "TestUser").await);
        assert_eq!(cache.silenced_count(), 1);
    }

    #[tokio::test]
    async fn test_different_users_independent() {
        let cache = UnauthorizedCache::new(60, 120, 100);

        cache.mark_sent(111).await;
        assert!(cache.should_send(222, "User2").await);
    }

    #[tokio::test]
    async fn test_reply_allowed_again_after_cooldown() {
        let cache = UnauthorizedCache::new(1, 120, 100);

        cache.mark_sent(12345).await;
        assert!(!cache.should_send(12345, "TestUser").await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.should_send(12345, "TestUser").await);
    }

    #[tokio::test]
    async fn test_entry_count() {
        let cache = UnauthorizedCache::new(60, 120, 100);

        cache.mark_sent(111).await;
        cache.mark_sent(222).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.entry_count(), 2);
    }
}
