//! Small helpers shared by the bot layer: text truncation and retrying
//! Telegram API calls.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use tubegrab_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Truncate to `max_chars` including a trailing ellipsis when cut.
#[must_use]
pub fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = truncate_str(s, max_chars.saturating_sub(1));
    out.push('…');
    out
}

/// Delays between attempts of a Telegram API call: exponential backoff
/// with jitter, one entry per retry.
pub fn telegram_retry_strategy() -> impl Iterator<Item = Duration> {
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES)
}

/// Retry a Telegram API operation with exponential backoff.
///
/// The retry strategy uses exponential backoff with jitter:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max retries: 3 after the first attempt, 4 attempts in total
///   (see constants in `config.rs`)
///
/// # Examples
///
/// ```no_run
/// use tubegrab_bot::utils::retry_telegram_operation;
/// use anyhow::Result;
///
/// async fn upload() -> Result<()> {
///     Ok(())
/// }
///
/// # async fn example() -> Result<()> {
/// retry_telegram_operation(|| async { upload().await }).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the last error once all attempts fail.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::TELEGRAM_API_MAX_RETRIES;

    Retry::spawn(telegram_retry_strategy(), operation)
        .await
        .map_err(|e| {
            warn!(
                "Telegram API operation failed after {} attempts: {}",
                TELEGRAM_API_MAX_RETRIES + 1,
                e
            );
            e
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("abcdefghij", 5), "abcd…");
        assert_eq!(ellipsize("🎵🎵🎵🎵", 3).chars().count(), 3);
    }

    #[test]
    fn test_retry_strategy_counts_retries() {
        use crate::config::{TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES};

        // One delay per retry; the first attempt has none
        let delays: Vec<Duration> = telegram_retry_strategy().collect();
        assert_eq!(delays.len(), TELEGRAM_API_MAX_RETRIES);
        assert_eq!(delays.len(), 3);
        assert!(delays
            .iter()
            .all(|d| *d <= Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS)));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() -> Result<()> {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value = retry_telegram_operation(|| async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("network hiccup");
            }
            Ok(7)
        })
        .await?;
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
