//! Initial migration to create the gitsweep database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_tracked_repositories(manager).await?;
        self.create_tracked_projects(manager).await?;
        self.create_issues(manager).await?;
        self.create_issue_comments(manager).await?;
        self.create_pull_requests(manager).await?;
        self.create_commits(manager).await?;
        self.create_project_fields(manager).await?;
        self.create_project_items(manager).await?;
        self.create_sync_checkpoints(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncCheckpoints::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectFields::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Commits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PullRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IssueComments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Issues::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TrackedProjects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TrackedRepositories::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_tracked_repositories(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrackedRepositories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrackedRepositories::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TrackedRepositories::Scope).string().not_null())
                    .col(ColumnDef::new(TrackedRepositories::Owner).string().not_null())
                    .col(ColumnDef::new(TrackedRepositories::Name).string().not_null())
                    .col(
                        ColumnDef::new(TrackedRepositories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackedRepositories::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique constraint on (scope, owner, name)
        manager
            .create_index(
                Index::create()
                    .name("idx_tracked_repos_scope_owner_name")
                    .table(TrackedRepositories::Table)
                    .col(TrackedRepositories::Scope)
                    .col(TrackedRepositories::Owner)
                    .col(TrackedRepositories::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_tracked_projects(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrackedProjects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrackedProjects::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TrackedProjects::Scope).string().not_null())
                    .col(
                        ColumnDef::new(TrackedProjects::NodeId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(TrackedProjects::Title).string().null())
                    .col(
                        ColumnDef::new(TrackedProjects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackedProjects::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn create_issues(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Issues::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Issues::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Issues::RepositoryId).uuid().not_null())
                    // Identity
                    .col(
                        ColumnDef::new(Issues::NodeId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Issues::Number).integer().not_null())
                    // Content
                    .col(ColumnDef::new(Issues::Title).string().not_null())
                    .col(ColumnDef::new(Issues::Body).text().null())
                    .col(ColumnDef::new(Issues::Author).string().null())
                    .col(
                        ColumnDef::new(Issues::Labels)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(ColumnDef::new(Issues::IssueType).string().null())
                    .col(ColumnDef::new(Issues::Url).string().not_null())
                    // Lifecycle
                    .col(ColumnDef::new(Issues::State).string().not_null())
                    .col(ColumnDef::new(Issues::StateReason).string().null())
                    .col(
                        ColumnDef::new(Issues::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Issues::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Issues::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    // Tracking
                    .col(
                        ColumnDef::new(Issues::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Index on repository_id for reconciliation scans
        manager
            .create_index(
                Index::create()
                    .name("idx_issues_repository")
                    .table(Issues::Table)
                    .col(Issues::RepositoryId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_issue_comments(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IssueComments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IssueComments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IssueComments::IssueId).uuid().not_null())
                    .col(
                        ColumnDef::new(IssueComments::NodeId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(IssueComments::Author).string().null())
                    .col(ColumnDef::new(IssueComments::Body).text().not_null())
                    .col(ColumnDef::new(IssueComments::Url).string().not_null())
                    .col(
                        ColumnDef::new(IssueComments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IssueComments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IssueComments::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_issue_comments_issue")
                    .table(IssueComments::Table)
                    .col(IssueComments::IssueId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_pull_requests(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PullRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PullRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PullRequests::RepositoryId).uuid().not_null())
                    // Identity
                    .col(
                        ColumnDef::new(PullRequests::NodeId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(PullRequests::Number).integer().not_null())
                    // Content
                    .col(ColumnDef::new(PullRequests::Title).string().not_null())
                    .col(ColumnDef::new(PullRequests::Body).text().null())
                    .col(ColumnDef::new(PullRequests::Author).string().null())
                    .col(
                        ColumnDef::new(PullRequests::Labels)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(ColumnDef::new(PullRequests::HeadRef).string().not_null())
                    .col(ColumnDef::new(PullRequests::BaseRef).string().not_null())
                    .col(ColumnDef::new(PullRequests::Url).string().not_null())
                    // Lifecycle
                    .col(ColumnDef::new(PullRequests::State).string().not_null())
                    .col(
                        ColumnDef::new(PullRequests::IsDraft)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PullRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::MergedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    // Tracking
                    .col(
                        ColumnDef::new(PullRequests::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pull_requests_repository")
                    .table(PullRequests::Table)
                    .col(PullRequests::RepositoryId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_commits(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Commits::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Commits::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Commits::RepositoryId).uuid().not_null())
                    .col(ColumnDef::new(Commits::Oid).string().not_null())
                    .col(ColumnDef::new(Commits::MessageHeadline).string().not_null())
                    .col(ColumnDef::new(Commits::Message).text().not_null())
                    .col(ColumnDef::new(Commits::AuthorName).string().null())
                    .col(ColumnDef::new(Commits::AuthorEmail).string().null())
                    .col(ColumnDef::new(Commits::AuthorLogin).string().null())
                    .col(
                        ColumnDef::new(Commits::CommittedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Commits::Additions)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Commits::Deletions)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Commits::Url).string().not_null())
                    .col(
                        ColumnDef::new(Commits::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique constraint on (repository_id, oid)
        manager
            .create_index(
                Index::create()
                    .name("idx_commits_repository_oid")
                    .table(Commits::Table)
                    .col(Commits::RepositoryId)
                    .col(Commits::Oid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_project_fields(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProjectFields::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectFields::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProjectFields::ProjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProjectFields::NodeId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ProjectFields::Name).string().not_null())
                    .col(ColumnDef::new(ProjectFields::DataType).string().not_null())
                    .col(
                        ColumnDef::new(ProjectFields::Options)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(ProjectFields::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_project_fields_project")
                    .table(ProjectFields::Table)
                    .col(ProjectFields::ProjectId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_project_items(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProjectItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProjectItems::ProjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProjectItems::NodeId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ProjectItems::ItemType).string().not_null())
                    .col(
                        ColumnDef::new(ProjectItems::IsArchived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ProjectItems::ContentNodeId).string().null())
                    .col(ColumnDef::new(ProjectItems::ContentTitle).string().null())
                    .col(
                        ColumnDef::new(ProjectItems::FieldValues)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(ProjectItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectItems::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_project_items_project")
                    .table(ProjectItems::Table)
                    .col(ProjectItems::ProjectId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_checkpoints(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncCheckpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncCheckpoints::SyncTargetId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncCheckpoints::Cursor).text().not_null())
                    .col(
                        ColumnDef::new(SyncCheckpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum TrackedRepositories {
    Table,
    Id,
    Scope,
    Owner,
    Name,
    CreatedAt,
    LastSyncedAt,
}

#[derive(DeriveIden)]
enum TrackedProjects {
    Table,
    Id,
    Scope,
    NodeId,
    Title,
    CreatedAt,
    LastSyncedAt,
}

#[derive(DeriveIden)]
enum Issues {
    Table,
    Id,
    RepositoryId,
    NodeId,
    Number,
    Title,
    Body,
    Author,
    Labels,
    IssueType,
    Url,
    State,
    StateReason,
    CreatedAt,
    UpdatedAt,
    ClosedAt,
    SyncedAt,
}

#[derive(DeriveIden)]
enum IssueComments {
    Table,
    Id,
    IssueId,
    NodeId,
    Author,
    Body,
    Url,
    CreatedAt,
    UpdatedAt,
    SyncedAt,
}

#[derive(DeriveIden)]
enum PullRequests {
    Table,
    Id,
    RepositoryId,
    NodeId,
    Number,
    Title,
    Body,
    Author,
    Labels,
    HeadRef,
    BaseRef,
    Url,
    State,
    IsDraft,
    CreatedAt,
    UpdatedAt,
    ClosedAt,
    MergedAt,
    SyncedAt,
}

#[derive(DeriveIden)]
enum Commits {
    Table,
    Id,
    RepositoryId,
    Oid,
    MessageHeadline,
    Message,
    AuthorName,
    AuthorEmail,
    AuthorLogin,
    CommittedAt,
    Additions,
    Deletions,
    Url,
    SyncedAt,
}

#[derive(DeriveIden)]
enum ProjectFields {
    Table,
    Id,
    ProjectId,
    NodeId,
    Name,
    DataType,
    Options,
    SyncedAt,
}

#[derive(DeriveIden)]
enum ProjectItems {
    Table,
    Id,
    ProjectId,
    NodeId,
    ItemType,
    IsArchived,
    ContentNodeId,
    ContentTitle,
    FieldValues,
    CreatedAt,
    UpdatedAt,
    SyncedAt,
}

#[derive(DeriveIden)]
enum SyncCheckpoints {
    Table,
    SyncTargetId,
    Cursor,
    UpdatedAt,
}
