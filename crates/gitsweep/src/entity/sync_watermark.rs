//! When each sweep of a target last completed, keyed like checkpoints.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_watermarks")]
pub struct Model {
    /// `{target_id}:{sweep}`, e.g. `{repository_id}:pulls`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub sync_target_id: String,
    /// Start time of the last sweep that completed.
    pub last_synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
