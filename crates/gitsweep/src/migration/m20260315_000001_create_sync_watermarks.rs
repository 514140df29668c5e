//! Track the last completed sweep per `{target}:{sweep}` instead of one
//! timestamp per target, so the issue, pull request and commit sweeps of a
//! repository each keep their own incremental bound.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncWatermarks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncWatermarks::SyncTargetId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SyncWatermarks::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncWatermarks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncWatermarks {
    Table,
    SyncTargetId,
    LastSyncedAt,
}
