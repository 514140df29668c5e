//! Commit entity (default-branch history).

use sea_orm::entity::prelude::*;
use sea_orm::{QueryFilter, Select};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub repository_id: Uuid,
    /// Git object id. Unique per repository.
    pub oid: String,
    pub message_headline: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_login: Option<String>,
    pub committed_at: DateTimeWithTimeZone,
    pub additions: i32,
    pub deletions: i32,
    pub url: String,
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
    pub fn find_by_oid(repository_id: Uuid, oid: &str) -> Select<Entity> {
        Self::find()
            .filter(Column::RepositoryId.eq(repository_id))
            .filter(Column::Oid.eq(oid))
    }

    pub fn find_by_repository(repository_id: Uuid) -> Select<Entity> {
        Self::find().filter(Column::RepositoryId.eq(repository_id))
    }
}
