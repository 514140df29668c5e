//! Sweeps that mirror GitHub entities into the local store.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncResult`, `SyncStatus`, `SweepOptions`, `SyncSettings`
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`target`] - Resolving and registering tracked repositories and projects
//! - [`engine`] - The orchestrator: [`SyncEngine`]

pub mod engine;
mod progress;
pub mod target;
mod types;

pub use engine::SyncEngine;
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use target::TargetError;
pub use types::{
    DEFAULT_INCREMENTAL_BUFFER, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_SIZE, SweepOptions, SyncError,
    SyncResult, SyncSettings, SyncStatus,
};
