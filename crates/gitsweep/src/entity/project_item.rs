//! Project (v2) items: issues, pull requests and draft issues on a board.

use sea_orm::entity::prelude::*;
use sea_orm::{QueryFilter, Select};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    #[sea_orm(unique)]
    pub node_id: String,
    /// `ISSUE`, `PULL_REQUEST`, `DRAFT_ISSUE` or `REDACTED`.
    pub item_type: String,
    pub is_archived: bool,
    /// Node id of the linked issue or pull request.
    pub content_node_id: Option<String>,
    pub content_title: Option<String>,
    /// Field name to value, as reported by the board (JSON object).
    #[sea_orm(column_type = "Json")]
    pub field_values: serde_json::Value,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tracked_project::Entity",
        from = "Column::ProjectId",
        to = "super::tracked_project::Column::Id"
    )]
    Project,
}

impl Related<super::tracked_project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Entity {
    pub fn find_by_node_id(node_id: &str) -> Select<Entity> {
        Self::find().filter(Column::NodeId.eq(node_id))
    }

    pub fn find_by_project(project_id: Uuid) -> Select<Entity> {
        Self::find().filter(Column::ProjectId.eq(project_id))
    }
}
