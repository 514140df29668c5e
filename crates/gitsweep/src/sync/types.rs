//! Shared sync types and tuning constants.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::backoff::BackoffConfig;
use crate::classify::Classification;
use crate::events::EntityKind;
use crate::graphql::CredentialError;
use crate::pagination::{DEFAULT_MAX_PAGES, DEFAULT_REQUEST_TIMEOUT, PaginationError};
use crate::rate_limit::DEFAULT_MAX_WAIT;
use crate::retry::DEFAULT_TRANSPORT_RETRIES;

/// Nodes requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Failed attempts allowed for one page before the sweep aborts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Subtracted from the last sync time to absorb clock skew.
pub const DEFAULT_INCREMENTAL_BUFFER: Duration = Duration::from_secs(5 * 60);

/// How a sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Completed,
    /// Finished, but something was skipped: a page cap was hit, one phase
    /// of a multi-phase sweep failed, or stale entities could not be removed.
    CompletedWithWarnings,
    AbortedRateLimit,
    AbortedError,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Completed => "completed",
            SyncStatus::CompletedWithWarnings => "completed_with_warnings",
            SyncStatus::AbortedRateLimit => "aborted_rate_limit",
            SyncStatus::AbortedError => "aborted_error",
        }
    }

    pub fn is_aborted(self) -> bool {
        matches!(self, SyncStatus::AbortedRateLimit | SyncStatus::AbortedError)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one sweep, returned to the caller and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    /// Entities processed.
    pub count: usize,
    /// Stale entities removed by reconciliation.
    pub deleted: usize,
    /// Pages fetched and processed.
    pub pages: usize,
    /// Per-phase success for multi-phase sweeps.
    pub phases: BTreeMap<&'static str, bool>,
}

impl SyncResult {
    pub fn new(status: SyncStatus, count: usize) -> Self {
        Self {
            status,
            count,
            deleted: 0,
            pages: 0,
            phases: BTreeMap::new(),
        }
    }

    /// Nothing to do.
    pub fn empty() -> Self {
        Self::new(SyncStatus::Completed, 0)
    }

    pub fn aborted_error(count: usize) -> Self {
        Self::new(SyncStatus::AbortedError, count)
    }
}

/// Where a sweep starts and whether it checkpoints.
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Checkpoint key. When set, a stored cursor is restored at the start
    /// and every page with a successor writes one.
    pub sync_target_id: Option<String>,
    /// Explicit starting cursor. Takes precedence over a stored checkpoint.
    pub initial_cursor: Option<String>,
    /// Time of the last successful sweep, enabling incremental mode.
    pub last_sync: Option<DateTime<Utc>>,
}

impl SweepOptions {
    #[must_use]
    pub fn resumable(mut self, sync_target_id: impl Into<String>) -> Self {
        self.sync_target_id = Some(sync_target_id.into());
        self
    }

    #[must_use]
    pub fn from_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.initial_cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn since_last_sync(mut self, last_sync: DateTime<Utc>) -> Self {
        self.last_sync = Some(last_sync);
        self
    }
}

/// Operational tuning for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: u32,
    pub max_pages: usize,
    pub request_timeout: Duration,
    /// Failed attempts allowed per page, counting the first.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
    /// Retries of a single request inside the paginator.
    pub transport_retries: usize,
    /// Longest single sleep after a rate-limited page.
    pub rate_limit_wait_cap: Duration,
    pub incremental_buffer: Duration,
    /// Window for a first sync. `None` means a full sweep.
    pub initial_lookback: Option<Duration>,
    pub probe: bool,
    pub reconcile: bool,
    /// Optional request pacing in addition to quota tracking.
    pub requests_per_second: Option<u32>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffConfig::default(),
            transport_retries: DEFAULT_TRANSPORT_RETRIES,
            rate_limit_wait_cap: DEFAULT_MAX_WAIT,
            incremental_buffer: DEFAULT_INCREMENTAL_BUFFER,
            initial_lookback: None,
            probe: true,
            reconcile: true,
            requests_per_second: None,
        }
    }
}

impl SyncSettings {
    /// Lower bound for incremental filtering.
    ///
    /// `last_sync - incremental_buffer` when a previous sync is known,
    /// otherwise `now - initial_lookback`, otherwise no bound.
    pub fn since(
        &self,
        last_sync: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match (last_sync, self.initial_lookback) {
            (Some(last), _) => Some(earlier(last, self.incremental_buffer)),
            (None, Some(lookback)) => Some(earlier(now, lookback)),
            (None, None) => None,
        }
    }
}

fn earlier(t: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|d| t.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Failures surfaced to the caller instead of a [`SyncResult`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// No usable credentials for the scope. Never retried.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// An authentication or client error; retrying cannot help.
    #[error("{kind} sweep failed ({}): {}", .classification.category, .classification.message)]
    Fatal {
        kind: EntityKind,
        classification: Classification,
    },

    /// A malformed pagination request. A programming error.
    #[error(transparent)]
    InvalidRequest(PaginationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn since_subtracts_buffer_from_last_sync() {
        let settings = SyncSettings::default();
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let since = settings.since(Some(last), Utc::now()).unwrap();
        assert_eq!(since, Utc.with_ymd_and_hms(2026, 3, 1, 11, 55, 0).unwrap());
    }

    #[test]
    fn since_uses_lookback_only_on_first_sync() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        let mut settings = SyncSettings::default();
        assert_eq!(settings.since(None, now), None);

        settings.initial_lookback = Some(Duration::from_secs(2 * 86_400));
        assert_eq!(
            settings.since(None, now),
            Some(Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn aborted_statuses() {
        assert!(SyncStatus::AbortedRateLimit.is_aborted());
        assert!(SyncStatus::AbortedError.is_aborted());
        assert!(!SyncStatus::CompletedWithWarnings.is_aborted());
        assert_eq!(SyncStatus::AbortedRateLimit.to_string(), "aborted_rate_limit");
    }

    #[test]
    fn options_builders() {
        let opts = SweepOptions::default().resumable("r:issues").from_cursor("c2");
        assert_eq!(opts.sync_target_id.as_deref(), Some("r:issues"));
        assert_eq!(opts.initial_cursor.as_deref(), Some("c2"));
        assert!(opts.last_sync.is_none());
    }
}
