//! Backoff for the setup steps of a run (connect, health check, count).
//!
//! Inserts never go through here: each write is attempted exactly once.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Error message fragments the MongoDB driver uses for transient failures
/// and replica-set elections.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection closed",
    "server selection",
    "temporary",
    "not primary",
    "not master",
    "node is recovering",
    "shutdown in progress",
];

/// Backoff policy for setup steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Upper bound for a single wait.
    pub max_delay: Duration,
    /// Spread each wait by up to a quarter of its length.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_setup(3)
    }
}

impl RetryConfig {
    /// Policy used by the CLI: `max_retries` retries starting at 500ms.
    #[must_use]
    pub fn for_setup(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// A single attempt, no waiting.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Wait before retry number `retry` (1-based). Zero for the first attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let Some(doublings) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };
        let factor = 1u32.checked_shl(doublings).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        if self.jitter {
            delay + delay.mul_f64(0.25 * jitter_fraction())
        } else {
            delay
        }
    }
}

fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.subsec_nanos());
    f64::from(nanos % 1024) / 1024.0
}

/// `true` if a setup error looks transient (network blip, failover).
#[must_use]
pub fn is_retryable_error(error: &Error) -> bool {
    let message = match error {
        Error::Io(_) => return true,
        Error::SourceConnection(message)
        | Error::Count { message, .. }
        | Error::CursorOpen { message, .. } => message.to_lowercase(),
        _ => return false,
    };
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Runs `operation` until it succeeds, fails permanently, or the retries in
/// `config` are spent. The last error is returned.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, step: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        let error = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    info!(step, retries = retry, "Setup step recovered");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if retry >= config.max_retries || !is_retryable_error(&error) {
            return Err(error);
        }
        retry += 1;

        let delay = config.delay_for_attempt(retry);
        warn!(
            step,
            retry,
            max_retries = config.max_retries,
            ?delay,
            error = %error,
            "Setup step failed, retrying"
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: false,
            ..RetryConfig::for_setup(10)
        };

        let delays: Vec<u64> = (0..=5)
            .map(|retry| config.delay_for_attempt(retry).as_secs())
            .collect();

        assert_eq!(delays, vec![0, 1, 2, 4, 5, 5]);
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let config = RetryConfig::for_setup(3);
        let delay = config.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(625));
    }

    #[test]
    fn test_transient_setup_errors_are_retried() {
        assert!(is_retryable_error(&Error::SourceConnection(
            "Server selection timeout: No available servers".to_string()
        )));
        assert!(is_retryable_error(&Error::Count {
            collection: "cierre".to_string(),
            message: "NotWritablePrimary: not primary".to_string(),
        }));
        assert!(!is_retryable_error(&Error::SourceConnection(
            "Authentication failed".to_string()
        )));
    }

    #[test]
    fn test_insert_errors_are_never_retried() {
        let error = Error::insert("checkins_2021", "connection reset");
        assert!(!is_retryable_error(&error));
    }

    #[tokio::test]
    async fn test_with_retry_recovers() {
        // Arrange
        let counter = AtomicU32::new(0);
        let calls = &counter;

        // Act
        let result = with_retry(&quick(3), "ping", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::SourceConnection("connection refused".to_string()))
            } else {
                Ok(7_u64)
            }
        })
        .await;

        // Assert
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_attempt_counts() {
        let cases = [
            (quick(2), "operation timed out", 3),
            (quick(5), "Authentication failed", 1),
            (RetryConfig::no_retry(), "connection refused", 1),
        ];

        for (config, message, expected_calls) in cases {
            let counter = AtomicU32::new(0);
            let calls = &counter;
            let result: Result<u64> = with_retry(&config, "count", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::SourceConnection(message.to_string()))
            })
            .await;

            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), expected_calls, "{message}");
        }
    }
}
