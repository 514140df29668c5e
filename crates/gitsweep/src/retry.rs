//! Transport retry built on `backon`, with delays from [`crate::backoff`].

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};

use crate::backoff::{self, BackoffConfig};
use crate::classify::{ErrorCategory, classify_with_details};
use crate::graphql::TransportError;

/// Default number of retries for a single request.
pub const DEFAULT_TRANSPORT_RETRIES: usize = 2;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay curve between attempts.
    pub backoff: BackoffConfig,
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_retries: DEFAULT_TRANSPORT_RETRIES,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(backoff: BackoffConfig, max_retries: usize) -> Self {
        Self {
            backoff,
            max_retries,
        }
    }

    /// A configuration that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_retries: 0,
        }
    }
}

impl BackoffBuilder for RetryConfig {
    type Backoff = CalculatedBackoff;

    fn build(self) -> Self::Backoff {
        CalculatedBackoff {
            config: self.backoff,
            attempt: 0,
            remaining: self.max_retries,
        }
    }
}

/// Finite delay sequence following [`backoff::delay`].
#[derive(Debug, Clone)]
pub struct CalculatedBackoff {
    config: BackoffConfig,
    attempt: i32,
    remaining: usize,
}

impl Iterator for CalculatedBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let delay = backoff::delay(self.attempt, &self.config);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

/// Run one request, retrying failures classified as
/// [`ErrorCategory::Retryable`].
///
/// Every other failure is returned on first occurrence so the caller can
/// apply its own policy (rate-limit waits, fatal errors).
///
/// # Example
///
/// ```ignore
/// use gitsweep::retry::{RetryConfig, with_retry};
///
/// let response = with_retry(
///     || client.execute(document, &variables, timeout),
///     &RetryConfig::default(),
///     "acme",
/// )
/// .await?;
/// ```
pub async fn with_retry<T, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    label: &str,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    // Track attempt number for logging
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.clone())
        .notify(|err, dur| {
            tracing::debug!(
                label,
                attempt = attempt.load(Ordering::SeqCst),
                retry_in_ms = dur.as_millis() as u64,
                "request failed, retrying: {err}"
            );
        })
        .when(|err: &TransportError| {
            classify_with_details(Some(err)).category == ErrorCategory::Retryable
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig::new(BackoffConfig::from_millis(10, 100, 0).unwrap(), 3)
    }

    #[test]
    fn retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff, BackoffConfig::default());
        assert_eq!(config.max_retries, DEFAULT_TRANSPORT_RETRIES);
    }

    #[test]
    fn built_backoff_follows_calculator_and_is_finite() {
        let delays: Vec<_> = fast().build().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40)
            ]
        );
        assert_eq!(RetryConfig::none().build().next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let result = with_retry(
            move || {
                let calls_capture = Arc::clone(&calls_capture);
                async move {
                    let n = calls_capture.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(TransportError::http(502, Vec::new(), "bad gateway"))
                    } else {
                        Ok(42u32)
                    }
                }
            },
            &fast(),
            "acme",
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let err = with_retry(
            move || {
                let calls_capture = Arc::clone(&calls_capture);
                async move {
                    calls_capture.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TransportError::Connect("refused".into()))
                }
            },
            &fast(),
            "acme",
        )
        .await
        .expect_err("expected error");

        assert!(matches!(err, TransportError::Connect(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn does_not_retry_rate_limits_or_fatal_errors() {
        for status in [401, 404, 422, 429] {
            let calls = Arc::new(AtomicU32::new(0));
            let calls_capture = Arc::clone(&calls);

            let err = with_retry(
                move || {
                    let calls_capture = Arc::clone(&calls_capture);
                    async move {
                        calls_capture.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(TransportError::http(status, Vec::new(), "nope"))
                    }
                },
                &fast(),
                "acme",
            )
            .await
            .expect_err("expected error");

            assert_eq!(err.status(), Some(status));
            assert_eq!(calls.load(Ordering::SeqCst), 1, "status {status}");
        }
    }
}
