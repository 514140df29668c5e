//! Stores the sync engine owns outside the entity tables.

pub mod checkpoint;
pub mod watermark;

pub use checkpoint::{CheckpointError, CheckpointStore, DbCheckpointStore, MemoryCheckpointStore};
