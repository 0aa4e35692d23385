//! Bounded retry with a fixed delay.
//!
//! Download, backup-move and extraction all retry with the same combinator,
//! parameterised by attempt budget, delay and a predicate that decides which
//! errors are worth another attempt. Errors the predicate rejects surface
//! immediately as [`RetryError::Fatal`].

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least one.
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        let max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        Self {
            max_attempts,
            delay,
        }
    }

    /// Three attempts, 500ms apart.
    pub const fn download() -> Self {
        Self::new(3, Duration::from_millis(500))
    }

    /// Up to five minutes of 1s retries. File handles held by a process that
    /// has just exited can take well over a minute to be released on some
    /// Windows systems.
    pub const fn backup_move() -> Self {
        Self::new(5 * 60 + 1, Duration::from_secs(1))
    }

    /// Four attempts (three retries), 250ms apart.
    pub const fn extract() -> Self {
        Self::new(4, Duration::from_millis(250))
    }

    /// Single attempt, no delay.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Why a retried operation ultimately failed.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The predicate classified the error as not retryable.
    #[error("{0}")]
    Fatal(E),

    /// Every attempt failed with a retryable error; holds the last one.
    #[error("{last} (after {attempts} attempts)")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error.
    pub fn inner(&self) -> &E {
        match self {
            Self::Fatal(e) | Self::Exhausted { last: e, .. } => e,
        }
    }

    /// Number of attempts that were made, if the budget was exhausted.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Fatal(_) => None,
            Self::Exhausted { attempts, .. } => Some(*attempts),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number. `label` only appears in logs.
pub async fn retry<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = AtomicU32::new(0);
    let strategy = FixedInterval::new(policy.delay).take(policy.max_attempts.saturating_sub(1) as usize);

    let action = || op(attempts.fetch_add(1, Ordering::Relaxed) + 1);
    let condition = |e: &E| {
        let attempt = attempts.load(Ordering::Relaxed);
        let retryable = is_retryable(e);
        if retryable && attempt < policy.max_attempts {
            tracing::warn!(
                "{label} attempt {attempt}/{} failed, retrying in {:?}: {e}",
                policy.max_attempts,
                policy.delay
            );
        }
        retryable
    };

    let result = RetryIf::start(strategy, action, condition).await;
    let attempt = attempts.load(Ordering::Relaxed);
    match result {
        Ok(value) => {
            if attempt > 1 {
                tracing::info!("{label} succeeded on attempt {attempt}");
            }
            Ok(value)
        }
        Err(e) if !is_retryable(&e) => {
            tracing::debug!("{label} failed with non-retryable error: {e}");
            Err(RetryError::Fatal(e))
        }
        Err(e) => {
            tracing::error!("{label} failed after {attempt} attempts: {e}");
            Err(RetryError::Exhausted {
                attempts: attempt,
                last: e,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn quick(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, RetryError<String>> = retry(
            quick(3),
            "test",
            |_| true,
            |attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(format!("boom {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let result: Result<(), RetryError<&str>> =
            retry(quick(4), "test", |_| true, |_| async { Err("nope") }).await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last, "nope");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), RetryError<&str>> = retry(
            quick(5),
            "test",
            |e: &&str| *e != "fatal",
            |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal("fatal"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::extract().max_attempts, 4);
        assert_eq!(RetryPolicy::backup_move().max_attempts, 301);
    }
}
