//! Exponential backoff delay calculation.
//!
//! `delay(n) = min(base * 2^n, max) + uniform[0, jitter]`

use std::time::Duration;

use rand::Rng;

use crate::cancel::{Cancellation, Cancelled};

/// Default delay for the first retry.
pub const DEFAULT_BASE_MS: i64 = 1_000;
/// Default ceiling for the exponential part of the delay.
pub const DEFAULT_MAX_MS: i64 = 60_000;
/// Default upper bound of the random jitter added to every delay.
pub const DEFAULT_JITTER_MS: i64 = 1_000;

/// Errors produced when building a backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("invalid backoff argument: {name} must be >= 0 (got {value})")]
    InvalidArgument { name: &'static str, value: i64 },
}

/// Parameters of the backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BASE_MS as u64),
            max: Duration::from_millis(DEFAULT_MAX_MS as u64),
            jitter: Duration::from_millis(DEFAULT_JITTER_MS as u64),
        }
    }
}

impl BackoffConfig {
    /// Build a configuration from signed millisecond values, as they arrive
    /// from configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`BackoffError::InvalidArgument`] if any value is negative.
    pub fn from_millis(base: i64, max: i64, jitter: i64) -> Result<Self, BackoffError> {
        Ok(Self {
            base: non_negative("base", base)?,
            max: non_negative("max", max)?,
            jitter: non_negative("jitter", jitter)?,
        })
    }

    /// Same curve without jitter. Useful when delays must be deterministic.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = Duration::ZERO;
        self
    }

    /// The deterministic part of the delay for `attempt`.
    pub fn ceiling(&self, attempt: i32) -> Duration {
        let attempt = attempt.max(0) as u32;
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

fn non_negative(name: &'static str, value: i64) -> Result<Duration, BackoffError> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| BackoffError::InvalidArgument { name, value })
}

/// Compute the delay before retry number `attempt` (0-based).
///
/// Negative attempts are treated as 0.
pub fn delay(attempt: i32, config: &BackoffConfig) -> Duration {
    let jitter_ms = config.jitter.as_millis() as u64;
    let jitter = if jitter_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    };
    config.ceiling(attempt).saturating_add(jitter)
}

/// Sleep for [`delay`] unless `cancel` fires first.
///
/// Returns the slept duration.
pub async fn sleep(
    attempt: i32,
    config: &BackoffConfig,
    cancel: &Cancellation,
) -> Result<Duration, Cancelled> {
    let wait = delay(attempt, config);
    cancel.sleep(wait).await?;
    Ok(wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;

    fn in_range(d: Duration, low_ms: u64, high_ms: u64) -> bool {
        d >= Duration::from_millis(low_ms) && d <= Duration::from_millis(high_ms)
    }

    #[test]
    fn delay_doubles_until_capped() {
        let config = BackoffConfig::default();
        for attempt in 0..=6 {
            let ceiling = (1_000u64 << attempt).min(60_000);
            for _ in 0..50 {
                let d = delay(attempt, &config);
                assert!(
                    in_range(d, ceiling, ceiling + 1_000),
                    "attempt {attempt}: {d:?} outside [{ceiling}, {}]",
                    ceiling + 1_000
                );
            }
        }
    }

    #[test]
    fn delay_stays_capped_for_large_attempts() {
        let config = BackoffConfig::default();
        for attempt in [6, 7, 10, 31, 32, 64, i32::MAX] {
            let d = delay(attempt, &config);
            assert!(in_range(d, 60_000, 61_000), "attempt {attempt}: {d:?}");
        }
    }

    #[test]
    fn negative_attempt_is_treated_as_zero() {
        let config = BackoffConfig::default().without_jitter();
        assert_eq!(delay(-3, &config), Duration::from_secs(1));
        assert_eq!(delay(i32::MIN, &config), Duration::from_secs(1));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let config = BackoffConfig::from_millis(100, 1_000, 0).unwrap();
        assert_eq!(delay(0, &config), Duration::from_millis(100));
        assert_eq!(delay(3, &config), Duration::from_millis(800));
        assert_eq!(delay(4, &config), Duration::from_millis(1_000));
    }

    #[test]
    fn negative_arguments_are_rejected() {
        assert_eq!(
            BackoffConfig::from_millis(-1, 10, 0),
            Err(BackoffError::InvalidArgument {
                name: "base",
                value: -1
            })
        );
        assert!(matches!(
            BackoffConfig::from_millis(1, -10, 0),
            Err(BackoffError::InvalidArgument { name: "max", .. })
        ));
        assert!(matches!(
            BackoffConfig::from_millis(1, 10, -5),
            Err(BackoffError::InvalidArgument { name: "jitter", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_returns_slept_duration() {
        let config = BackoffConfig::from_millis(250, 1_000, 0).unwrap();
        let slept = sleep(1, &config, &Cancellation::never()).await.unwrap();
        assert_eq!(slept, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_propagates_cancellation() {
        let (handle, token) = cancellation();
        handle.cancel();
        let result = sleep(0, &BackoffConfig::default(), &token).await;
        assert_eq!(result, Err(Cancelled));
    }
}
