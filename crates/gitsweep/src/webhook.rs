//! Push-path entry point for webhook deliveries.
//!
//! Each call runs one idempotent processor operation in its own transaction
//! and publishes the resulting events only after the commit succeeds. A
//! redelivered webhook therefore produces no duplicate rows, and an
//! unchanged entity produces no events.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use thiserror::Error;

use crate::entity::{issue, issue_comment, project_item, pull_request};
use crate::events::{DomainEvent, EventContext, EventPublisher, publish_all};
use crate::processor::{
    CommentNode, CommentProcessor, IssueNode, IssueProcessor, ProcessError, Processed, Processor,
    ProjectItemNode, ProjectItemProcessor, PullRequestNode, PullRequestProcessor,
};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Applies webhook payloads through the same processors the sweeps use.
pub struct WebhookProcessor {
    db: Arc<DatabaseConnection>,
    publisher: Arc<dyn EventPublisher>,
}

impl WebhookProcessor {
    pub fn new(db: Arc<DatabaseConnection>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { db, publisher }
    }

    async fn commit<M>(
        &self,
        txn: DatabaseTransaction,
        processed: Processed<M>,
    ) -> Result<Processed<M>, WebhookError> {
        txn.commit().await?;
        publish_all(self.publisher.as_ref(), processed.events.clone());
        Ok(processed)
    }

    async fn commit_deleted(
        &self,
        txn: DatabaseTransaction,
        event: Option<DomainEvent>,
    ) -> Result<bool, WebhookError> {
        txn.commit().await?;
        let deleted = event.is_some();
        publish_all(self.publisher.as_ref(), event.into_iter().collect());
        Ok(deleted)
    }

    // ─── Issues ──────────────────────────────────────────────────────────────

    pub async fn process_issue(
        &self,
        node: &IssueNode,
        ctx: &EventContext,
    ) -> Result<Processed<issue::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = IssueProcessor.process(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_issue_closed(
        &self,
        node: &IssueNode,
        ctx: &EventContext,
        reason: Option<String>,
    ) -> Result<Processed<issue::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = IssueProcessor.process_closed(&txn, node, ctx, reason).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_issue_reopened(
        &self,
        node: &IssueNode,
        ctx: &EventContext,
    ) -> Result<Processed<issue::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = IssueProcessor.process_reopened(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_issue_labeled(
        &self,
        node: &IssueNode,
        ctx: &EventContext,
        label: &str,
    ) -> Result<Processed<issue::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = IssueProcessor.process_labeled(&txn, node, ctx, label).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_issue_unlabeled(
        &self,
        node: &IssueNode,
        ctx: &EventContext,
        label: &str,
    ) -> Result<Processed<issue::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = IssueProcessor
            .process_unlabeled(&txn, node, ctx, label)
            .await?;
        self.commit(txn, processed).await
    }

    pub async fn process_issue_typed(
        &self,
        node: &IssueNode,
        ctx: &EventContext,
    ) -> Result<Processed<issue::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = IssueProcessor.process_typed(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    /// Remove an issue and its comments. Returns whether a row existed.
    pub async fn process_issue_deleted(
        &self,
        node_id: &str,
        ctx: &EventContext,
    ) -> Result<bool, WebhookError> {
        let txn = self.db.begin().await?;
        let event = IssueProcessor
            .delete_by_external_id(&txn, node_id, ctx)
            .await?;
        self.commit_deleted(txn, event).await
    }

    // ─── Pull requests ───────────────────────────────────────────────────────

    pub async fn process_pull_request(
        &self,
        node: &PullRequestNode,
        ctx: &EventContext,
    ) -> Result<Processed<pull_request::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = PullRequestProcessor.process(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_pull_request_closed(
        &self,
        node: &PullRequestNode,
        ctx: &EventContext,
    ) -> Result<Processed<pull_request::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = PullRequestProcessor.process_closed(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_pull_request_reopened(
        &self,
        node: &PullRequestNode,
        ctx: &EventContext,
    ) -> Result<Processed<pull_request::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = PullRequestProcessor
            .process_reopened(&txn, node, ctx)
            .await?;
        self.commit(txn, processed).await
    }

    pub async fn process_pull_request_merged(
        &self,
        node: &PullRequestNode,
        ctx: &EventContext,
    ) -> Result<Processed<pull_request::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = PullRequestProcessor.process_merged(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_pull_request_labeled(
        &self,
        node: &PullRequestNode,
        ctx: &EventContext,
        label: &str,
    ) -> Result<Processed<pull_request::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = PullRequestProcessor
            .process_labeled(&txn, node, ctx, label)
            .await?;
        self.commit(txn, processed).await
    }

    pub async fn process_pull_request_unlabeled(
        &self,
        node: &PullRequestNode,
        ctx: &EventContext,
        label: &str,
    ) -> Result<Processed<pull_request::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = PullRequestProcessor
            .process_unlabeled(&txn, node, ctx, label)
            .await?;
        self.commit(txn, processed).await
    }

    // ─── Comments and project items ──────────────────────────────────────────

    /// `ctx.parent_id` must be the stored issue's id.
    pub async fn process_comment(
        &self,
        node: &CommentNode,
        ctx: &EventContext,
    ) -> Result<Processed<issue_comment::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = CommentProcessor.process(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_comment_deleted(
        &self,
        node_id: &str,
        ctx: &EventContext,
    ) -> Result<bool, WebhookError> {
        let txn = self.db.begin().await?;
        let event = CommentProcessor
            .delete_by_external_id(&txn, node_id, ctx)
            .await?;
        self.commit_deleted(txn, event).await
    }

    /// `ctx.parent_id` must be the tracked project's id.
    pub async fn process_project_item(
        &self,
        node: &ProjectItemNode,
        ctx: &EventContext,
    ) -> Result<Processed<project_item::Model>, WebhookError> {
        let txn = self.db.begin().await?;
        let processed = ProjectItemProcessor.process(&txn, node, ctx).await?;
        self.commit(txn, processed).await
    }

    pub async fn process_project_item_deleted(
        &self,
        node_id: &str,
        ctx: &EventContext,
    ) -> Result<bool, WebhookError> {
        let txn = self.db.begin().await?;
        let event = ProjectItemProcessor
            .delete_by_external_id(&txn, node_id, ctx)
            .await?;
        self.commit_deleted(txn, event).await
    }
}
