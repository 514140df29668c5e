//! Default-branch commits.
//!
//! Commits are keyed by `(repository, oid)` rather than a node id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel};
use serde::Deserialize;
use uuid::Uuid;

use super::{Actor, ProcessError, Processed, Processor, diff_fields};
use crate::entity::commit::{Entity as Commit, Model};
use crate::events::{EntityKind, EventContext};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user: Option<Actor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitNode {
    pub oid: String,
    pub message_headline: String,
    pub message: String,
    pub url: String,
    pub committed_date: DateTime<Utc>,
    #[serde(default)]
    pub additions: i32,
    #[serde(default)]
    pub deletions: i32,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

impl CommitNode {
    fn to_model(&self, id: Uuid, repository_id: Uuid, synced_at: DateTime<Utc>) -> Model {
        let author = self.author.as_ref();
        Model {
            id,
            repository_id,
            oid: self.oid.clone(),
            message_headline: self.message_headline.clone(),
            message: self.message.clone(),
            author_name: author.and_then(|a| a.name.clone()),
            author_email: author.and_then(|a| a.email.clone()),
            author_login: author.and_then(|a| a.user.as_ref()).map(|u| u.login.clone()),
            committed_at: self.committed_date.fixed_offset(),
            additions: self.additions,
            deletions: self.deletions,
            url: self.url.clone(),
            synced_at: synced_at.fixed_offset(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitProcessor;

#[async_trait]
impl Processor for CommitProcessor {
    type Node = CommitNode;
    type Model = Model;

    const KIND: EntityKind = EntityKind::Commit;

    fn external_id(node: &CommitNode) -> &str {
        &node.oid
    }

    fn updated_at(node: &CommitNode) -> Option<DateTime<Utc>> {
        Some(node.committed_date)
    }

    fn model_external_id(model: &Model) -> &str {
        &model.oid
    }

    async fn find(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
        external_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        Commit::find_by_oid(ctx.parent_id, external_id).one(txn).await
    }

    async fn find_all_by_parent(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
    ) -> Result<Vec<Model>, DbErr> {
        Commit::find_by_repository(ctx.parent_id).all(txn).await
    }

    async fn delete(&self, txn: &DatabaseTransaction, model: &Model) -> Result<(), DbErr> {
        Commit::delete_by_id(model.id).exec(txn).await?;
        Ok(())
    }

    async fn process(
        &self,
        txn: &DatabaseTransaction,
        node: &CommitNode,
        ctx: &EventContext,
    ) -> Result<Processed<Model>, ProcessError> {
        let now = Utc::now();
        let Some(prev) = self.find(txn, ctx, &node.oid).await? else {
            let model = node
                .to_model(Uuid::new_v4(), ctx.parent_id, now)
                .into_active_model()
                .reset_all()
                .insert(txn)
                .await?;
            return Ok(Processed::created(model, ctx));
        };

        let next = node.to_model(prev.id, prev.repository_id, now);
        let changed = diff_fields!(prev, next;
            message_headline, message, author_name, author_email, author_login,
            committed_at, additions, deletions, url,
        );
        if changed.is_empty() {
            return Ok(Processed::unchanged(prev));
        }
        let model = next.into_active_model().reset_all().update(txn).await?;
        Ok(Processed::updated(model, changed, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_login_comes_from_linked_user() {
        let node: CommitNode = serde_json::from_value(serde_json::json!({
            "oid": "abc123",
            "messageHeadline": "Fix build",
            "message": "Fix build\n\nDetails",
            "url": "https://github.com/o/r/commit/abc123",
            "committedDate": "2026-02-01T12:00:00Z",
            "additions": 3,
            "deletions": 1,
            "author": {"name": "Ada", "email": "ada@example.com", "user": null}
        }))
        .unwrap();

        let model = node.to_model(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        assert_eq!(model.author_name.as_deref(), Some("Ada"));
        assert_eq!(model.author_login, None);
        assert_eq!(model.additions, 3);
    }
}
