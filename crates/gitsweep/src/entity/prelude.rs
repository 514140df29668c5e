//! Common re-exports for convenient entity usage.

pub use super::commit::{
    ActiveModel as CommitActiveModel, Column as CommitColumn, Entity as Commit,
    Model as CommitModel,
};
pub use super::issue::{
    ActiveModel as IssueActiveModel, Column as IssueColumn, Entity as Issue, Model as IssueModel,
};
pub use super::issue_comment::{
    ActiveModel as IssueCommentActiveModel, Column as IssueCommentColumn,
    Entity as IssueComment, Model as IssueCommentModel,
};
pub use super::item_state::{IssueState, PullRequestState};
pub use super::project_field::{
    ActiveModel as ProjectFieldActiveModel, Column as ProjectFieldColumn,
    Entity as ProjectField, Model as ProjectFieldModel,
};
pub use super::project_item::{
    ActiveModel as ProjectItemActiveModel, Column as ProjectItemColumn, Entity as ProjectItem,
    Model as ProjectItemModel,
};
pub use super::pull_request::{
    ActiveModel as PullRequestActiveModel, Column as PullRequestColumn, Entity as PullRequest,
    Model as PullRequestModel,
};
pub use super::sync_checkpoint::{
    ActiveModel as SyncCheckpointActiveModel, Column as SyncCheckpointColumn,
    Entity as SyncCheckpoint, Model as SyncCheckpointModel,
};
pub use super::sync_watermark::{
    ActiveModel as SyncWatermarkActiveModel, Column as SyncWatermarkColumn,
    Entity as SyncWatermark, Model as SyncWatermarkModel,
};
pub use super::tracked_project::{
    ActiveModel as TrackedProjectActiveModel, Column as TrackedProjectColumn,
    Entity as TrackedProject, Model as TrackedProjectModel,
};
pub use super::tracked_repository::{
    ActiveModel as TrackedRepositoryActiveModel, Column as TrackedRepositoryColumn,
    Entity as TrackedRepository, Model as TrackedRepositoryModel,
};
