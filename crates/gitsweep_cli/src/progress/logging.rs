use gitsweep::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::SweepStarted {
                kind,
                target,
                resume_cursor,
                since,
            } => {
                tracing::info!(
                    kind = %kind,
                    target = %target,
                    resume_cursor = ?resume_cursor,
                    since = ?since,
                    "Sweep started"
                );
            }

            SyncProgress::ProbeSkipped { kind, target } => {
                tracing::info!(kind = %kind, target = %target, "No changes since last sync");
            }

            SyncProgress::ProbeFailed {
                kind,
                target,
                error,
            } => {
                tracing::warn!(
                    kind = %kind,
                    target = %target,
                    error = %error,
                    "Probe failed, fetching everything"
                );
            }

            SyncProgress::PageProcessed {
                kind,
                target,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(
                    kind = %kind,
                    target = %target,
                    page,
                    count,
                    total_so_far,
                    "Processed page"
                );
            }

            SyncProgress::Retrying {
                kind,
                target,
                category,
                attempt,
                wait_ms,
            } => {
                tracing::warn!(
                    kind = %kind,
                    target = %target,
                    category = %category,
                    attempt,
                    wait_ms,
                    "Page failed, retrying"
                );
            }

            SyncProgress::Reconciled {
                kind,
                target,
                deleted,
            } => {
                if deleted > 0 {
                    tracing::info!(
                        kind = %kind,
                        target = %target,
                        deleted,
                        "Removed stale entities"
                    );
                } else {
                    tracing::debug!(kind = %kind, target = %target, "Nothing to reconcile");
                }
            }

            SyncProgress::SweepFinished {
                kind,
                target,
                status,
                count,
            } => {
                if status.is_aborted() {
                    tracing::error!(
                        kind = %kind,
                        target = %target,
                        status = %status,
                        count,
                        "Sweep aborted"
                    );
                } else {
                    tracing::info!(
                        kind = %kind,
                        target = %target,
                        status = %status,
                        count,
                        "Sweep finished"
                    );
                }
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
