//! SeaORM entity definitions for the gitsweep database schema.

pub mod commit;
pub mod issue;
pub mod issue_comment;
pub mod item_state;
pub mod prelude;
pub mod project_field;
pub mod project_item;
pub mod pull_request;
pub mod sync_checkpoint;
pub mod sync_watermark;
pub mod tracked_project;
pub mod tracked_repository;
