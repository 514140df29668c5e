//! Issues.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{
    Actor, Named, Nodes, ProcessError, Processed, Processor, diff_fields, label_json, login,
};
use crate::entity::issue::{Entity as Issue, Model};
use crate::entity::issue_comment;
use crate::entity::item_state::IssueState;
use crate::events::{EntityKind, EventContext, EventKind};

/// An issue as selected by the issue queries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueNode {
    pub id: String,
    pub number: i32,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub url: String,
    pub state: IssueState,
    #[serde(default)]
    pub state_reason: Option<String>,
    #[serde(default)]
    pub author: Option<Actor>,
    #[serde(default)]
    pub labels: Option<Nodes<Named>>,
    #[serde(default)]
    pub issue_type: Option<Named>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl IssueNode {
    fn to_model(&self, id: Uuid, repository_id: Uuid, synced_at: DateTime<Utc>) -> Model {
        Model {
            id,
            repository_id,
            node_id: self.id.clone(),
            number: self.number,
            title: self.title.clone(),
            body: self.body.clone(),
            author: login(self.author.as_ref()),
            labels: label_json(self.labels.as_ref()),
            issue_type: self.issue_type.as_ref().map(|t| t.name.clone()),
            url: self.url.clone(),
            state: self.state,
            state_reason: self.state_reason.clone(),
            created_at: self.created_at.fixed_offset(),
            updated_at: self.updated_at.fixed_offset(),
            closed_at: self.closed_at.map(|t| t.fixed_offset()),
            synced_at: synced_at.fixed_offset(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IssueProcessor;

#[async_trait]
impl Processor for IssueProcessor {
    type Node = IssueNode;
    type Model = Model;

    const KIND: EntityKind = EntityKind::Issue;

    fn external_id(node: &IssueNode) -> &str {
        &node.id
    }

    fn updated_at(node: &IssueNode) -> Option<DateTime<Utc>> {
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
        Issue::find_by_node_id(external_id).one(txn).await
    }

    async fn find_all_by_parent(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
    ) -> Result<Vec<Model>, DbErr> {
        Issue::find_by_repository(ctx.parent_id).all(txn).await
    }

    async fn delete(&self, txn: &DatabaseTransaction, model: &Model) -> Result<(), DbErr> {
        // Comments belong to the issue; drop them with it.
        issue_comment::Entity::delete_many()
            .filter(issue_comment::Column::IssueId.eq(model.id))
            .exec(txn)
            .await?;
        Issue::delete_by_id(model.id).exec(txn).await?;
        Ok(())
    }

    async fn process(
        &self,
        txn: &DatabaseTransaction,
        node: &IssueNode,
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

        // Transferred issues move to the repository being synced.
        let next = node.to_model(prev.id, ctx.parent_id, now);
        let changed = diff_fields!(prev, next;
            repository_id, number, title, body, author, labels, issue_type, url,
            state, state_reason, created_at, updated_at, closed_at,
        );
        if changed.is_empty() {
            return Ok(Processed::unchanged(prev));
        }
        let model = next.into_active_model().reset_all().update(txn).await?;
        Ok(Processed::updated(model, changed, ctx))
    }
}

impl IssueProcessor {
    pub async fn process_closed(
        &self,
        txn: &DatabaseTransaction,
        node: &IssueNode,
        ctx: &EventContext,
        reason: Option<String>,
    ) -> Result<Processed<Model>, ProcessError> {
        let processed = self.process(txn, node, ctx).await?;
        Ok(processed.with_event(EventKind::Closed { reason }, ctx))
    }

    pub async fn process_reopened(
        &self,
        txn: &DatabaseTransaction,
        node: &IssueNode,
        ctx: &EventContext,
    ) -> Result<Processed<Model>, ProcessError> {
        let processed = self.process(txn, node, ctx).await?;
        Ok(processed.with_event(EventKind::Reopened, ctx))
    }

    pub async fn process_labeled(
        &self,
        txn: &DatabaseTransaction,
        node: &IssueNode,
        ctx: &EventContext,
        label: impl Into<String>,
    ) -> Result<Processed<Model>, ProcessError> {
        let label = label.into();
        let processed = self.process(txn, node, ctx).await?;
        Ok(processed.with_event(EventKind::Labeled { label }, ctx))
    }

    pub async fn process_unlabeled(
        &self,
        txn: &DatabaseTransaction,
        node: &IssueNode,
        ctx: &EventContext,
        label: impl Into<String>,
    ) -> Result<Processed<Model>, ProcessError> {
        let label = label.into();
        let processed = self.process(txn, node, ctx).await?;
        Ok(processed.with_event(EventKind::Unlabeled { label }, ctx))
    }

    pub async fn process_typed(
        &self,
        txn: &DatabaseTransaction,
        node: &IssueNode,
        ctx: &EventContext,
    ) -> Result<Processed<Model>, ProcessError> {
        let issue_type = node.issue_type.as_ref().map(|t| t.name.clone());
        let processed = self.process(txn, node, ctx).await?;
        Ok(processed.with_event(EventKind::Typed { issue_type }, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> IssueNode {
        serde_json::from_value(serde_json::json!({
            "id": "I_1",
            "number": 7,
            "title": "Crash on start",
            "body": null,
            "url": "https://github.com/o/r/issues/7",
            "state": "CLOSED",
            "stateReason": "COMPLETED",
            "author": null,
            "labels": {"nodes": [{"name": "bug"}, null]},
            "issueType": {"name": "Bug"},
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-02T00:00:00Z",
            "closedAt": "2026-01-02T00:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn decodes_graphql_shape() {
        let node = node();
        assert_eq!(node.state, IssueState::Closed);
        assert_eq!(node.issue_type.as_ref().map(|t| t.name.as_str()), Some("Bug"));
        assert!(node.author.is_none());
    }

    #[test]
    fn to_model_maps_every_field() {
        let repo = Uuid::new_v4();
        let model = node().to_model(Uuid::new_v4(), repo, Utc::now());
        assert_eq!(model.repository_id, repo);
        assert_eq!(model.labels, serde_json::json!(["bug"]));
        assert_eq!(model.issue_type.as_deref(), Some("Bug"));
        assert_eq!(model.state_reason.as_deref(), Some("COMPLETED"));
        assert!(model.closed_at.is_some());
    }
}
