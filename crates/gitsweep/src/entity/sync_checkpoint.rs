//! Persisted pagination cursors, keyed by sync target.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_checkpoints")]
pub struct Model {
    /// Caller-chosen id of the sweep target, e.g. `{repository_id}:issues`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub sync_target_id: String,
    #[sea_orm(column_type = "Text")]
    pub cursor: String,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
