//! Project (v2) field definitions.

use sea_orm::entity::prelude::*;
use sea_orm::{QueryFilter, Select};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_fields")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    #[sea_orm(unique)]
    pub node_id: String,
    pub name: String,
    /// GitHub's `ProjectV2FieldType` (`TEXT`, `SINGLE_SELECT`, ...).
    pub data_type: String,
    /// Options of single-select fields (JSON array of names).
    #[sea_orm(column_type = "Json")]
    pub options: serde_json::Value,
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
