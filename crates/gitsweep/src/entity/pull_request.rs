//! Pull request entity.

use sea_orm::entity::prelude::*;
use sea_orm::{QueryFilter, Select};
use serde::{Deserialize, Serialize};

use super::item_state::PullRequestState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pull_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub repository_id: Uuid,

    // ─── Identity ────────────────────────────────────────────────────────────
    #[sea_orm(unique)]
    pub node_id: String,
    pub number: i32,

    // ─── Content ─────────────────────────────────────────────────────────────
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,
    pub author: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub labels: serde_json::Value,
    pub head_ref: String,
    pub base_ref: String,
    pub url: String,

    // ─── Lifecycle ───────────────────────────────────────────────────────────
    pub state: PullRequestState,
    pub is_draft: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub closed_at: Option<DateTimeWithTimeZone>,
    pub merged_at: Option<DateTimeWithTimeZone>,

    // ─── Tracking ────────────────────────────────────────────────────────────
    pub synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tracked_repository::Entity",
        from = "Column::RepositoryId",
        to = "super::tracked_repository::Column::Id"
    )]
    Repository,
}

impl Related<super::tracked_repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Entity {
    pub fn find_by_node_id(node_id: &str) -> Select<Entity> {
        Self::find().filter(Column::NodeId.eq(node_id))
    }

    pub fn find_by_repository(repository_id: Uuid) -> Select<Entity> {
        Self::find().filter(Column::RepositoryId.eq(repository_id))
    }
}
