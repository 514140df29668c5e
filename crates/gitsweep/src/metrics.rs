//! Sync engine metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use ::metrics::{counter, describe_counter, describe_gauge, gauge};

// ============================================================================
// Metric Names
// ============================================================================

/// Error classifications, labeled by category.
pub const ERROR_CLASSIFICATIONS: &str = "gitsweep_error_classifications_total";

/// Pages fetched and processed, labeled by entity kind.
pub const PAGES_FETCHED: &str = "gitsweep_pages_fetched_total";

/// Finished sweeps, labeled by entity kind and final status.
pub const SWEEPS: &str = "gitsweep_sweeps_total";

/// Last observed remaining API quota, labeled by scope.
pub const RATE_LIMIT_REMAINING: &str = "gitsweep_rate_limit_remaining";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all metric descriptions.
///
/// Call this once at application startup after installing a recorder.
pub fn register_metrics() {
    describe_counter!(ERROR_CLASSIFICATIONS, "Total classified API failures");
    describe_counter!(PAGES_FETCHED, "Total connection pages processed");
    describe_counter!(SWEEPS, "Total finished sync sweeps");
    describe_gauge!(RATE_LIMIT_REMAINING, "Remaining API quota per scope");
}

// ============================================================================
// Recording
// ============================================================================

pub fn record_classification(category: &'static str) {
    counter!(ERROR_CLASSIFICATIONS, "category" => category).increment(1);
}

pub fn record_page(kind: &'static str) {
    counter!(PAGES_FETCHED, "kind" => kind).increment(1);
}

pub fn record_sweep(kind: &'static str, status: &'static str) {
    counter!(SWEEPS, "kind" => kind, "status" => status).increment(1);
}

pub fn record_rate_limit_remaining(scope: &str, remaining: u32) {
    gauge!(RATE_LIMIT_REMAINING, "scope" => scope.to_string()).set(f64::from(remaining));
}
