//! Issue comments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel};
use serde::Deserialize;
use uuid::Uuid;

use super::{Actor, ProcessError, Processed, Processor, diff_fields, login};
use crate::entity::issue_comment::{Entity as IssueComment, Model};
use crate::events::{EntityKind, EventContext};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    pub id: String,
    pub body: String,
    pub url: String,
    #[serde(default)]
    pub author: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentNode {
    fn to_model(&self, id: Uuid, issue_id: Uuid, synced_at: DateTime<Utc>) -> Model {
        Model {
            id,
            issue_id,
            node_id: self.id.clone(),
            author: login(self.author.as_ref()),
            body: self.body.clone(),
            url: self.url.clone(),
            created_at: self.created_at.fixed_offset(),
            updated_at: self.updated_at.fixed_offset(),
            synced_at: synced_at.fixed_offset(),
        }
    }
}

/// Comments are children of a stored issue; the context's parent is the
/// issue row.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentProcessor;

#[async_trait]
impl Processor for CommentProcessor {
    type Node = CommentNode;
    type Model = Model;

    const KIND: EntityKind = EntityKind::IssueComment;

    fn external_id(node: &CommentNode) -> &str {
        &node.id
    }

    fn updated_at(node: &CommentNode) -> Option<DateTime<Utc>> {
        Some(node.updated_at)
    }

    fn model_external_id(model: &Model) -> &str {
        &model.node_id
    }

    async fn find(
        &self,
        txn: &DatabaseTransaction,
        _ctx: &EventContext,
        external_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        IssueComment::find_by_node_id(external_id).one(txn).await
    }

    async fn find_all_by_parent(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
    ) -> Result<Vec<Model>, DbErr> {
        IssueComment::find_by_issue(ctx.parent_id).all(txn).await
    }

    async fn delete(&self, txn: &DatabaseTransaction, model: &Model) -> Result<(), DbErr> {
        IssueComment::delete_by_id(model.id).exec(txn).await?;
        Ok(())
    }

    async fn process(
        &self,
        txn: &DatabaseTransaction,
        node: &CommentNode,
        ctx: &EventContext,
    ) -> Result<Processed<Model>, ProcessError> {
        let now = Utc::now();
        let Some(prev) = self.find(txn, ctx, &node.id).await? else {
            let model = node
                .to_model(Uuid::new_v4(), ctx.parent_id, now)
                .into_active_model()
                .reset_all()
                .insert(txn)
                .await?;
            return Ok(Processed::created(model, ctx));
        };

        let next = node.to_model(prev.id, prev.issue_id, now);
        let changed = diff_fields!(prev, next; author, body, url, created_at, updated_at);
        if changed.is_empty() {
            return Ok(Processed::unchanged(prev));
        }
        let model = next.into_active_model().reset_all().update(txn).await?;
        Ok(Processed::updated(model, changed, ctx))
    }
}
