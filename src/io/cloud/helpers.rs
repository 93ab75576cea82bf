//! Helpers shared by [`ObjectIO`](super::ObjectIO) consumers.
//!
//! - [`retry_with_backoff`] - Retry transient failures with exponential backoff
//! - [`split_bucket_key`] - Split a backend path into bucket and key

use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind};
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Retry Helper
// ============================================================================

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    fn next_delay(&self, delay_ms: u64) -> u64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let scaled = (delay_ms as f64 * self.backoff_multiplier.max(1.0)) as u64;
        scaled.min(self.max_delay_ms)
    }
}

/// Retry a function with exponential backoff
///
/// Only errors whose [`ErrorKind::is_transient`] is true are retried; all
/// others are returned on first occurrence.
///
/// # Errors
///
/// Returns the last error if the operation fails with a non-transient kind or
/// the maximum number of attempts is exhausted
pub fn retry_with_backoff<F, T>(config: &RetryConfig, op: &str, mut operation: F) -> CloudResult<T>
where
    F: FnMut() -> CloudResult<T>,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.kind.is_transient() || attempt >= config.max_attempts {
                    return Err(err);
                }

                warn!(
                    %op,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms,
                    error = %err,
                    "retrying after transient error"
                );
                std::thread::sleep(Duration::from_millis(delay_ms));
                delay_ms = config.next_delay(delay_ms);
            }
        }
    }
}

// ============================================================================
// Path Helper
// ============================================================================

/// Split `"/bucket/some/key"` (leading slash optional) into `("bucket", "some/key")`.
///
/// The key may be empty when the path names the bucket itself.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidInput`] if no bucket is named
pub fn split_bucket_key(path: &str) -> CloudResult<(&str, &str)> {
    let trimmed = path.trim_start_matches('/');
    let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if bucket.is_empty() {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("path \"{path}\" does not name a bucket"),
        ));
    }
    Ok((bucket, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_retries_transient_until_success() {
        let calls = Cell::new(0);
        let out = retry_with_backoff(&fast(), "op", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(CloudIOError::new(ErrorKind::Network, "flaky"))
            } else {
                Ok(7)
            }
        })
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let calls = Cell::new(0);
        let err = retry_with_backoff(&fast(), "op", || -> CloudResult<()> {
            calls.set(calls.get() + 1);
            Err(CloudIOError::new(ErrorKind::Authorization, "denied"))
        })
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let err = retry_with_backoff(&fast(), "op", || -> CloudResult<()> {
            calls.set(calls.get() + 1);
            Err(CloudIOError::new(ErrorKind::Timeout, "slow"))
        })
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_split_bucket_key() {
        assert_eq!(split_bucket_key("/b/k/x.json").unwrap(), ("b", "k/x.json"));
        assert_eq!(split_bucket_key("b/k").unwrap(), ("b", "k"));
        assert_eq!(split_bucket_key("/b").unwrap(), ("b", ""));
        assert!(split_bucket_key("/").is_err());
    }
}
