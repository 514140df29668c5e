//! Progress reporting for sweeps.
//!
//! The engine emits [`SyncProgress`] events through an optional callback so
//! callers (the CLI, a scheduler) can observe a sweep without parsing logs.

use chrono::{DateTime, Utc};

use super::types::SyncStatus;
use crate::classify::ErrorCategory;
use crate::events::EntityKind;

/// Progress events emitted during a sweep.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A sweep resolved its target and is about to fetch.
    SweepStarted {
        kind: EntityKind,
        /// Human-readable target, e.g. `owner/name`.
        target: String,
        /// Cursor the sweep resumes from, if any.
        resume_cursor: Option<String>,
        /// Lower bound for incremental mode.
        since: Option<DateTime<Utc>>,
    },

    /// The incremental probe found nothing newer than `since`.
    ProbeSkipped { kind: EntityKind, target: String },

    /// The probe failed; the sweep continues with a full fetch.
    ProbeFailed {
        kind: EntityKind,
        target: String,
        error: String,
    },

    /// A page was processed and committed.
    PageProcessed {
        kind: EntityKind,
        target: String,
        /// Page number within this sweep (1-indexed).
        page: usize,
        /// Entities on this page.
        count: usize,
        /// Running total for the sweep.
        total_so_far: usize,
    },

    /// A page failed and will be retried after a wait.
    Retrying {
        kind: EntityKind,
        target: String,
        category: ErrorCategory,
        /// Failed attempts for this page so far.
        attempt: u32,
        wait_ms: u64,
    },

    /// Stale entities were removed after a complete sweep.
    Reconciled {
        kind: EntityKind,
        target: String,
        deleted: usize,
    },

    /// The sweep ended.
    SweepFinished {
        kind: EntityKind,
        target: String,
        status: SyncStatus,
        count: usize,
    },

    /// Non-fatal problem worth surfacing.
    Warning { message: String },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
