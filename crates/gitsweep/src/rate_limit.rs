//! API quota tracking and request pacing.
//!
//! [`RateLimitTracker`] keeps the last known GraphQL quota per [`Scope`] and
//! decides when a sweep must stop or slow down. [`ApiRateLimiter`] is a
//! token bucket for smoothing request bursts on top of that.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};

use crate::cancel::{Cancellation, Cancelled};
use crate::graphql::{GraphQlClient, GraphQlResponse, TransportError, Variables};
use crate::metrics;
use crate::scope::Scope;

/// Below this many remaining points a scope is critical: stop issuing requests.
pub const DEFAULT_CRITICAL_THRESHOLD: u32 = 100;
/// Below this many remaining points a scope is low: wait for the reset.
pub const DEFAULT_LOW_THRESHOLD: u32 = 500;
/// Quota assumed for scopes that have not reported yet.
pub const DEFAULT_LIMIT: u32 = 5_000;
/// Longest single wait the tracker will recommend.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(15 * 60);
/// Extra wait past the reported reset to absorb clock skew.
pub const DEFAULT_RESET_MARGIN: Duration = Duration::from_secs(1);

/// Standalone query that only reads the current quota.
pub const RATE_LIMIT_QUERY: &str = "query { rateLimit { limit cost remaining resetAt used } }";

/// Thresholds and caps for [`RateLimitTracker`].
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub critical_threshold: u32,
    pub low_threshold: u32,
    pub default_limit: u32,
    pub max_wait: Duration,
    pub reset_margin: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            default_limit: DEFAULT_LIMIT,
            max_wait: DEFAULT_MAX_WAIT,
            reset_margin: DEFAULT_RESET_MARGIN,
        }
    }
}

/// Last known quota for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    pub remaining: u32,
    pub limit: u32,
    pub used: u32,
    pub last_cost: u32,
    pub reset_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl RateLimitState {
    /// Remaining points, treating a window whose reset has passed as full.
    fn effective_remaining(&self, now: DateTime<Utc>) -> u32 {
        match self.reset_at {
            Some(reset) if reset <= now => self.limit,
            _ => self.remaining,
        }
    }
}

/// The `rateLimit` object GitHub returns alongside query data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitField {
    limit: u32,
    remaining: u32,
    #[serde(default)]
    cost: Option<u32>,
    #[serde(default)]
    used: Option<u32>,
    #[serde(default)]
    reset_at: Option<DateTime<Utc>>,
}

/// Fields parsed from one response before merging into state.
struct Observation {
    limit: u32,
    remaining: u32,
    used: Option<u32>,
    cost: u32,
    reset_at: Option<DateTime<Utc>>,
}

impl Observation {
    fn from_response(response: &GraphQlResponse) -> Option<Self> {
        if let Ok(Some(field)) = response.field_as::<RateLimitField>("rateLimit") {
            return Some(Self {
                limit: field.limit,
                remaining: field.remaining,
                used: field.used,
                cost: field.cost.unwrap_or(1),
                reset_at: field.reset_at,
            });
        }

        let header = |name: &str| response.header(name).and_then(|v| v.trim().parse::<u64>().ok());
        let limit = header("x-ratelimit-limit")?;
        let remaining = header("x-ratelimit-remaining")?;
        Some(Self {
            limit: saturate(limit),
            remaining: saturate(remaining),
            used: header("x-ratelimit-used").map(saturate),
            cost: 1,
            reset_at: header("x-ratelimit-reset")
                .and_then(|secs| DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)),
        })
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

type Slot = Arc<Mutex<Option<RateLimitState>>>;

/// Per-scope quota state shared by every sweep in the process.
///
/// Each scope has its own lock, so sweeps for different scopes never
/// contend on updates.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    slots: RwLock<HashMap<Scope, Slot>>,
    config: RateLimitConfig,
}

impl RateLimitTracker {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn existing_slot(&self, scope: &Scope) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope)
            .cloned()
    }

    fn slot(&self, scope: &Scope) -> Slot {
        if let Some(slot) = self.existing_slot(scope) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(scope.clone()).or_default())
    }

    /// Record the quota reported by `response`.
    ///
    /// Does nothing and returns `None` when either argument is missing, the
    /// response is invalid, or it carries no quota information.
    pub fn update_from_response(
        &self,
        scope: Option<&Scope>,
        response: Option<&GraphQlResponse>,
    ) -> Option<RateLimitState> {
        let (scope, response) = (scope?, response?);
        if !response.is_valid() {
            return None;
        }
        let observed = Observation::from_response(response)?;
        Some(self.record(scope, observed, Utc::now()))
    }

    fn record(&self, scope: &Scope, observed: Observation, now: DateTime<Utc>) -> RateLimitState {
        let slot = self.slot(scope);
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());

        // A reset time still ahead of us is never moved backwards.
        let previous_reset = guard
            .as_ref()
            .and_then(|s| s.reset_at)
            .filter(|reset| *reset > now);
        let reset_at = match (previous_reset, observed.reset_at) {
            (Some(prev), Some(next)) => Some(prev.max(next)),
            (prev, next) => next.or(prev),
        };

        let remaining = observed.remaining.min(observed.limit);
        let state = RateLimitState {
            remaining,
            limit: observed.limit,
            used: observed
                .used
                .unwrap_or_else(|| observed.limit.saturating_sub(remaining)),
            last_cost: observed.cost,
            reset_at,
            last_updated: now,
        };
        *guard = Some(state.clone());
        drop(guard);

        metrics::record_rate_limit_remaining(scope.as_str(), state.remaining);
        tracing::debug!(
            scope = %scope,
            remaining = state.remaining,
            limit = state.limit,
            cost = state.last_cost,
            reset_at = ?state.reset_at,
            "rate limit updated"
        );
        state
    }

    /// Last recorded state, if the scope has reported.
    pub fn state(&self, scope: &Scope) -> Option<RateLimitState> {
        let slot = self.existing_slot(scope)?;
        let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    fn remaining_at(&self, scope: &Scope, now: DateTime<Utc>) -> u32 {
        self.state(scope)
            .map_or(self.config.default_limit, |s| s.effective_remaining(now))
    }

    /// Remaining points, assuming a full quota for unknown scopes.
    pub fn remaining(&self, scope: &Scope) -> u32 {
        self.remaining_at(scope, Utc::now())
    }

    /// True when the scope must not issue further requests.
    pub fn is_critical(&self, scope: &Scope) -> bool {
        self.remaining(scope) < self.config.critical_threshold
    }

    /// True when the scope should slow down until its reset.
    pub fn is_low(&self, scope: &Scope) -> bool {
        self.remaining(scope) < self.config.low_threshold
    }

    /// How long [`wait_if_needed`](Self::wait_if_needed) would sleep.
    pub fn recommended_delay(&self, scope: &Scope) -> Duration {
        self.recommended_delay_at(scope, Utc::now())
    }

    fn recommended_delay_at(&self, scope: &Scope, now: DateTime<Utc>) -> Duration {
        let Some(state) = self.state(scope) else {
            return Duration::ZERO;
        };
        if state.effective_remaining(now) >= self.config.low_threshold {
            return Duration::ZERO;
        }
        match state.reset_at {
            Some(reset) if reset > now => (reset - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .saturating_add(self.config.reset_margin)
                .min(self.config.max_wait),
            _ => Duration::ZERO,
        }
    }

    /// Sleep until the scope's quota resets if it is running low.
    ///
    /// Returns whether a wait happened.
    pub async fn wait_if_needed(
        &self,
        scope: &Scope,
        cancel: &Cancellation,
    ) -> Result<bool, Cancelled> {
        let delay = self.recommended_delay(scope);
        if delay.is_zero() {
            return Ok(false);
        }
        tracing::info!(
            scope = %scope,
            wait_ms = delay.as_millis() as u64,
            "rate limit low, waiting for reset"
        );
        cancel.sleep(delay).await?;
        Ok(true)
    }

    /// Query the current quota directly and record it.
    pub async fn refresh(
        &self,
        scope: &Scope,
        client: &dyn GraphQlClient,
        timeout: Duration,
    ) -> Result<Option<RateLimitState>, TransportError> {
        let response = client
            .execute(RATE_LIMIT_QUERY, &Variables::new(), timeout)
            .await?;
        Ok(self.update_from_response(Some(scope), Some(&response)))
    }
}

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A token bucket pacing individual requests.
///
/// # Example
///
/// ```ignore
/// use gitsweep::rate_limit::ApiRateLimiter;
///
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
///
/// // Before each API call:
/// limiter.wait().await;
/// client.execute(document, &variables, timeout).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A rate of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::mock::ScriptedClient;
    use serde_json::json;

    fn scope() -> Scope {
        Scope::new("acme")
    }

    fn response(remaining: u32, reset_at: DateTime<Utc>) -> GraphQlResponse {
        GraphQlResponse::from_data(json!({
            "rateLimit": {
                "limit": 5000,
                "cost": 2,
                "remaining": remaining,
                "used": 5000 - remaining,
                "resetAt": reset_at.to_rfc3339(),
            },
            "repository": {}
        }))
    }

    fn observation(remaining: u32, reset_at: Option<DateTime<Utc>>) -> Observation {
        Observation {
            limit: 5000,
            remaining,
            used: None,
            cost: 1,
            reset_at,
        }
    }

    #[test]
    fn parses_graphql_rate_limit_field() {
        let tracker = RateLimitTracker::default();
        let reset = Utc::now() + chrono::Duration::minutes(30);

        let state = tracker
            .update_from_response(Some(&scope()), Some(&response(4321, reset)))
            .unwrap();

        assert_eq!(state.remaining, 4321);
        assert_eq!(state.limit, 5000);
        assert_eq!(state.used, 679);
        assert_eq!(state.last_cost, 2);
        assert_eq!(state.reset_at.map(|t| t.timestamp()), Some(reset.timestamp()));
        assert_eq!(tracker.state(&scope()), Some(state));
    }

    #[test]
    fn falls_back_to_headers() {
        let tracker = RateLimitTracker::default();
        let reset = Utc::now().timestamp() + 600;
        let response = GraphQlResponse::from_data(json!({"viewer": {}})).with_headers(vec![
            ("x-ratelimit-limit".into(), "5000".into()),
            ("x-ratelimit-remaining".into(), "250".into()),
            ("x-ratelimit-used".into(), "4750".into()),
            ("x-ratelimit-reset".into(), reset.to_string()),
        ]);

        let state = tracker
            .update_from_response(Some(&scope()), Some(&response))
            .unwrap();

        assert_eq!(state.remaining, 250);
        assert_eq!(state.used, 4750);
        assert_eq!(state.reset_at.map(|t| t.timestamp()), Some(reset));
    }

    #[test]
    fn ignores_missing_or_invalid_input() {
        let tracker = RateLimitTracker::default();
        let valid = response(10, Utc::now());

        assert_eq!(tracker.update_from_response(None, Some(&valid)), None);
        assert_eq!(tracker.update_from_response(Some(&scope()), None), None);

        let invalid = GraphQlResponse::from_errors(vec![crate::graphql::GraphQlError::new(
            Some("NOT_FOUND"),
            "gone",
        )]);
        assert_eq!(tracker.update_from_response(Some(&scope()), Some(&invalid)), None);

        let no_field = GraphQlResponse::from_data(json!({"viewer": {}}));
        assert_eq!(tracker.update_from_response(Some(&scope()), Some(&no_field)), None);

        assert_eq!(tracker.state(&scope()), None);
    }

    #[test]
    fn remaining_is_clamped_to_limit() {
        let tracker = RateLimitTracker::default();
        let mut observed = observation(9000, None);
        observed.limit = 5000;
        let state = tracker.record(&scope(), observed, Utc::now());
        assert_eq!(state.remaining, 5000);
    }

    #[test]
    fn future_reset_never_moves_backwards() {
        let tracker = RateLimitTracker::default();
        let now = Utc::now();
        let later = now + chrono::Duration::minutes(40);
        let earlier = now + chrono::Duration::minutes(10);

        tracker.record(&scope(), observation(400, Some(later)), now);
        let state = tracker.record(&scope(), observation(390, Some(earlier)), now);

        assert_eq!(state.reset_at, Some(later));
        assert_eq!(state.remaining, 390);
    }

    #[test]
    fn passed_reset_is_replaced() {
        let tracker = RateLimitTracker::default();
        let now = Utc::now();
        let past = now - chrono::Duration::minutes(5);
        let next = now + chrono::Duration::minutes(55);

        tracker.record(&scope(), observation(10, Some(past)), now);
        let state = tracker.record(&scope(), observation(4999, Some(next)), now);

        assert_eq!(state.reset_at, Some(next));
    }

    #[test]
    fn thresholds_classify_scopes() {
        let tracker = RateLimitTracker::default();
        let reset = Some(Utc::now() + chrono::Duration::minutes(30));

        tracker.record(&scope(), observation(99, reset), Utc::now());
        assert!(tracker.is_critical(&scope()));
        assert!(tracker.is_low(&scope()));

        tracker.record(&scope(), observation(100, reset), Utc::now());
        assert!(!tracker.is_critical(&scope()));
        assert!(tracker.is_low(&scope()));

        tracker.record(&scope(), observation(500, reset), Utc::now());
        assert!(!tracker.is_critical(&scope()));
        assert!(!tracker.is_low(&scope()));
    }

    #[test]
    fn unknown_scopes_assume_full_quota() {
        let tracker = RateLimitTracker::default();
        let unknown = Scope::new("never-seen");

        assert_eq!(tracker.remaining(&unknown), DEFAULT_LIMIT);
        assert!(!tracker.is_critical(&unknown));
        assert!(!tracker.is_low(&unknown));
        assert_eq!(tracker.recommended_delay(&unknown), Duration::ZERO);
    }

    #[test]
    fn expired_window_counts_as_replenished() {
        let tracker = RateLimitTracker::default();
        let past = Some(Utc::now() - chrono::Duration::seconds(1));
        tracker.record(&scope(), observation(0, past), Utc::now());

        assert!(!tracker.is_critical(&scope()));
        assert_eq!(tracker.recommended_delay(&scope()), Duration::ZERO);
    }

    #[test]
    fn recommended_delay_waits_for_reset_and_is_capped() {
        let tracker = RateLimitTracker::new(RateLimitConfig {
            max_wait: Duration::from_secs(120),
            ..RateLimitConfig::default()
        });
        let now = Utc::now();

        tracker.record(&scope(), observation(200, Some(now + chrono::Duration::seconds(60))), now);
        let delay = tracker.recommended_delay_at(&scope(), now);
        assert_eq!(delay, Duration::from_secs(61));

        tracker.record(&scope(), observation(200, Some(now + chrono::Duration::hours(1))), now);
        assert_eq!(tracker.recommended_delay_at(&scope(), now), Duration::from_secs(120));

        let healthy = Scope::new("healthy");
        tracker.record(&healthy, observation(4000, Some(now + chrono::Duration::hours(1))), now);
        assert_eq!(tracker.recommended_delay_at(&healthy, now), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_sleeps_only_when_low() {
        let tracker = RateLimitTracker::default();
        let cancel = Cancellation::never();

        assert_eq!(tracker.wait_if_needed(&scope(), &cancel).await, Ok(false));

        let reset = Some(Utc::now() + chrono::Duration::seconds(30));
        tracker.record(&scope(), observation(20, reset), Utc::now());
        assert_eq!(tracker.wait_if_needed(&scope(), &cancel).await, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_propagates_cancellation() {
        let tracker = RateLimitTracker::default();
        let reset = Some(Utc::now() + chrono::Duration::minutes(10));
        tracker.record(&scope(), observation(20, reset), Utc::now());

        let (handle, cancel) = crate::cancel::cancellation();
        handle.cancel();
        assert_eq!(tracker.wait_if_needed(&scope(), &cancel).await, Err(Cancelled));
    }

    #[tokio::test]
    async fn refresh_records_standalone_query() {
        let tracker = RateLimitTracker::default();
        let client = ScriptedClient::new(vec![Ok(response(1234, Utc::now()))]);

        let state = tracker
            .refresh(&scope(), &client, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.remaining, 1234);
    }

    #[test]
    fn scopes_are_tracked_independently_across_threads() {
        let tracker = Arc::new(RateLimitTracker::default());
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let scope = Scope::from(i64::from(i));
                    for remaining in 0..50 {
                        let observed = observation(1000 + i * 10 + remaining, None);
                        tracker.record(&scope, observed, Utc::now());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8u32 {
            let state = tracker.state(&Scope::from(i64::from(i))).unwrap();
            assert_eq!(state.remaining, 1000 + i * 10 + 49);
        }
    }

    #[tokio::test]
    async fn api_rate_limiter_allows_first_request_immediately() {
        let limiter = ApiRateLimiter::new(0);
        tokio::time::timeout(Duration::from_secs(1), limiter.wait())
            .await
            .expect("first token should be available");
    }
}
