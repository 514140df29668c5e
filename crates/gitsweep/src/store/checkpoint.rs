//! Cursor checkpoints.
//!
//! A checkpoint is written after every page that has a successor and cleared
//! when a sweep completes. Writes go through their own commit boundary so a
//! rolled back page never takes its checkpoint with it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set, sea_query::OnConflict};
use thiserror::Error;

use crate::entity::sync_checkpoint::{ActiveModel, Column, Entity as SyncCheckpoint};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint storage error: {0}")]
    Database(#[from] DbErr),
}

/// Persists one optional cursor per sync target.
///
/// Writing the same cursor twice must be harmless.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, sync_target_id: &str) -> Result<Option<String>, CheckpointError>;

    /// Store `cursor`, or clear the checkpoint when it is `None`.
    async fn set(&self, sync_target_id: &str, cursor: Option<&str>) -> Result<(), CheckpointError>;
}

/// Checkpoints in the `sync_checkpoints` table.
///
/// Each write is a single statement on the connection, never inside a page
/// transaction.
#[derive(Debug, Clone)]
pub struct DbCheckpointStore {
    db: Arc<DatabaseConnection>,
}

impl DbCheckpointStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for DbCheckpointStore {
    async fn get(&self, sync_target_id: &str) -> Result<Option<String>, CheckpointError> {
        let row = SyncCheckpoint::find_by_id(sync_target_id.to_string())
            .one(self.db.as_ref())
            .await?;
        Ok(row.map(|r| r.cursor))
    }

    async fn set(&self, sync_target_id: &str, cursor: Option<&str>) -> Result<(), CheckpointError> {
        let Some(cursor) = cursor else {
            SyncCheckpoint::delete_by_id(sync_target_id.to_string())
                .exec(self.db.as_ref())
                .await?;
            return Ok(());
        };

        let model = ActiveModel {
            sync_target_id: Set(sync_target_id.to_string()),
            cursor: Set(cursor.to_string()),
            updated_at: Set(Utc::now().fixed_offset()),
        };
        SyncCheckpoint::insert(model)
            .on_conflict(
                OnConflict::column(Column::SyncTargetId)
                    .update_columns([Column::Cursor, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}

/// Process-local checkpoints.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    cursors: Mutex<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored cursor without going through the async trait.
    pub fn peek(&self, sync_target_id: &str) -> Option<String> {
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(sync_target_id)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, sync_target_id: &str) -> Result<Option<String>, CheckpointError> {
        Ok(self.peek(sync_target_id))
    }

    async fn set(&self, sync_target_id: &str, cursor: Option<&str>) -> Result<(), CheckpointError> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        match cursor {
            Some(cursor) => {
                cursors.insert(sync_target_id.to_string(), cursor.to_string());
            }
            None => {
                cursors.remove(sync_target_id);
            }
        }
        Ok(())
    }
}
