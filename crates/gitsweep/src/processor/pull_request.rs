//! Pull requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel};
use serde::Deserialize;
use uuid::Uuid;

use super::{
    Actor, Named, Nodes, ProcessError, Processed, Processor, diff_fields, label_json, login,
};
use crate::entity::item_state::PullRequestState;
use crate::entity::pull_request::{Entity as PullRequest, Model};
use crate::events::{EntityKind, EventContext, EventKind};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestNode {
    pub id: String,
    pub number: i32,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub url: String,
    pub state: PullRequestState,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub author: Option<Actor>,
    #[serde(default)]
    pub labels: Option<Nodes<Named>>,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestNode {
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
            head_ref: self.head_ref_name.clone(),
            base_ref: self.base_ref_name.clone(),
            url: self.url.clone(),
            state: self.state,
            is_draft: self.is_draft,
            created_at: self.created_at.fixed_offset(),
            updated_at: self.updated_at.fixed_offset(),
            closed_at: self.closed_at.map(|t| t.fixed_offset()),
            merged_at: self.merged_at.map(|t| t.fixed_offset()),
            synced_at: synced_at.fixed_offset(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PullRequestProcessor;

#[async_trait]
impl Processor for PullRequestProcessor {
    type Node = PullRequestNode;
    type Model = Model;

    const KIND: EntityKind = EntityKind::PullRequest;

    fn external_id(node: &PullRequestNode) -> &str {
        &node.id
    }

    fn updated_at(node: &PullRequestNode) -> Option<DateTime<Utc>> {
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
        PullRequest::find_by_node_id(external_id).one(txn).await
    }

    async fn find_all_by_parent(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
    ) -> Result<Vec<Model>, DbErr> {
        PullRequest::find_by_repository(ctx.parent_id).all(txn).await
    }

    async fn delete(&self, txn: &DatabaseTransaction, model: &Model) -> Result<(), DbErr> {
        PullRequest::delete_by_id(model.id).exec(txn).await?;
        Ok(())
    }

    async fn process(
        &self,
        txn: &DatabaseTransaction,
        node: &PullRequestNode,
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

        let next = node.to_model(prev.id, prev.repository_id, now);
        let changed = diff_fields!(prev, next;
            number, title, body, author, labels, head_ref, base_ref, url,
            state, is_draft, created_at, updated_at, closed_at, merged_at,
        );
        if changed.is_empty() {
            return Ok(Processed::unchanged(prev));
        }
        let model = next.into_active_model().reset_all().update(txn).await?;
        Ok(Processed::updated(model, changed, ctx))
    }
}

impl PullRequestProcessor {
    async fn process_then(
        &self,
        txn: &DatabaseTransaction,
        node: &PullRequestNode,
        ctx: &EventContext,
        event: EventKind,
    ) -> Result<Processed<Model>, ProcessError> {
        let processed = self.process(txn, node, ctx).await?;
        Ok(processed.with_event(event, ctx))
    }

    /// Closed without merging.
    pub async fn process_closed(
        &self,
        txn: &DatabaseTransaction,
        node: &PullRequestNode,
        ctx: &EventContext,
    ) -> Result<Processed<Model>, ProcessError> {
        self.process_then(txn, node, ctx, EventKind::Closed { reason: None })
            .await
    }

    pub async fn process_reopened(
        &self,
        txn: &DatabaseTransaction,
        node: &PullRequestNode,
        ctx: &EventContext,
    ) -> Result<Processed<Model>, ProcessError> {
        self.process_then(txn, node, ctx, EventKind::Reopened).await
    }

    pub async fn process_merged(
        &self,
        txn: &DatabaseTransaction,
        node: &PullRequestNode,
        ctx: &EventContext,
    ) -> Result<Processed<Model>, ProcessError> {
        self.process_then(txn, node, ctx, EventKind::Merged).await
    }

    pub async fn process_labeled(
        &self,
        txn: &DatabaseTransaction,
        node: &PullRequestNode,
        ctx: &EventContext,
        label: impl Into<String>,
    ) -> Result<Processed<Model>, ProcessError> {
        let event = EventKind::Labeled {
            label: label.into(),
        };
        self.process_then(txn, node, ctx, event).await
    }

    pub async fn process_unlabeled(
        &self,
        txn: &DatabaseTransaction,
        node: &PullRequestNode,
        ctx: &EventContext,
        label: impl Into<String>,
    ) -> Result<Processed<Model>, ProcessError> {
        let event = EventKind::Unlabeled {
            label: label.into(),
        };
        self.process_then(txn, node, ctx, event).await
    }
}
