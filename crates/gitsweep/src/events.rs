//! Domain events emitted after successful writes.
//!
//! Events are produced by processors and handed to an [`EventPublisher`].
//! Nothing in this crate reads an event back once it is published.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::entity::{commit, issue, issue_comment, project_field, project_item, pull_request};
use crate::scope::Scope;

/// The kinds of entity this crate keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Issue,
    PullRequest,
    IssueComment,
    Commit,
    ProjectField,
    ProjectItem,
}

impl EntityKind {
    /// Plural label used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Issue => "issues",
            EntityKind::PullRequest => "pull_requests",
            EntityKind::IssueComment => "issue_comments",
            EntityKind::Commit => "commits",
            EntityKind::ProjectField => "project_fields",
            EntityKind::ProjectItem => "project_items",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    Sync,
    Webhook,
}

/// Where an event happened: the scope and the parent the entity belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventContext {
    pub scope: Scope,
    /// Local id of the parent row (repository, project or issue).
    pub parent_id: Uuid,
    /// Human-readable parent reference, e.g. `owner/name`.
    pub parent: String,
    pub origin: EventOrigin,
}

impl EventContext {
    pub fn new(
        scope: Scope,
        parent_id: Uuid,
        parent: impl Into<String>,
        origin: EventOrigin,
    ) -> Self {
        Self {
            scope,
            parent_id,
            parent: parent.into(),
            origin,
        }
    }

    pub fn sync(scope: Scope, parent_id: Uuid, parent: impl Into<String>) -> Self {
        Self::new(scope, parent_id, parent, EventOrigin::Sync)
    }

    pub fn webhook(scope: Scope, parent_id: Uuid, parent: impl Into<String>) -> Self {
        Self::new(scope, parent_id, parent, EventOrigin::Webhook)
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated { changed: BTreeSet<&'static str> },
    Closed { reason: Option<String> },
    Reopened,
    Merged,
    Labeled { label: String },
    Unlabeled { label: String },
    Typed { issue_type: Option<String> },
    Deleted,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated { .. } => "updated",
            EventKind::Closed { .. } => "closed",
            EventKind::Reopened => "reopened",
            EventKind::Merged => "merged",
            EventKind::Labeled { .. } => "labeled",
            EventKind::Unlabeled { .. } => "unlabeled",
            EventKind::Typed { .. } => "typed",
            EventKind::Deleted => "deleted",
        }
    }
}

/// Snapshot of the affected row at the time of the event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum EntitySnapshot {
    Issue(issue::Model),
    PullRequest(pull_request::Model),
    IssueComment(issue_comment::Model),
    Commit(commit::Model),
    ProjectField(project_field::Model),
    ProjectItem(project_item::Model),
}

impl EntitySnapshot {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntitySnapshot::Issue(_) => EntityKind::Issue,
            EntitySnapshot::PullRequest(_) => EntityKind::PullRequest,
            EntitySnapshot::IssueComment(_) => EntityKind::IssueComment,
            EntitySnapshot::Commit(_) => EntityKind::Commit,
            EntitySnapshot::ProjectField(_) => EntityKind::ProjectField,
            EntitySnapshot::ProjectItem(_) => EntityKind::ProjectItem,
        }
    }

    /// The remote identifier of the snapshot (node id, or oid for commits).
    pub fn external_id(&self) -> &str {
        match self {
            EntitySnapshot::Issue(m) => &m.node_id,
            EntitySnapshot::PullRequest(m) => &m.node_id,
            EntitySnapshot::IssueComment(m) => &m.node_id,
            EntitySnapshot::Commit(m) => &m.oid,
            EntitySnapshot::ProjectField(m) => &m.node_id,
            EntitySnapshot::ProjectItem(m) => &m.node_id,
        }
    }
}

macro_rules! snapshot_from {
    ($($module:ident => $variant:ident),+ $(,)?) => {
        $(
            impl From<$module::Model> for EntitySnapshot {
                fn from(model: $module::Model) -> Self {
                    EntitySnapshot::$variant(model)
                }
            }
        )+
    };
}

snapshot_from! {
    issue => Issue,
    pull_request => PullRequest,
    issue_comment => IssueComment,
    commit => Commit,
    project_field => ProjectField,
    project_item => ProjectItem,
}

/// One lifecycle event for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(flatten)]
    pub entity: EntitySnapshot,
    pub context: EventContext,
}

impl DomainEvent {
    pub fn new(kind: EventKind, entity: impl Into<EntitySnapshot>, context: EventContext) -> Self {
        Self {
            kind,
            entity: entity.into(),
            context,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event receiver is closed")]
    Closed,

    #[error("publish failed: {0}")]
    Other(String),
}

/// Receives events. Delivery is fire-and-forget from the caller's side.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError>;
}

impl<P: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<P> {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        (**self).publish(event)
    }
}

/// Publish every event, logging failures instead of returning them.
///
/// Returns how many events were delivered.
pub fn publish_all(publisher: &dyn EventPublisher, events: Vec<DomainEvent>) -> usize {
    let mut delivered = 0;
    for event in events {
        let kind = event.kind.name();
        let entity = event.entity.kind();
        match publisher.publish(event) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(
                    event = kind,
                    entity = %entity,
                    error = %e,
                    "failed to publish event"
                );
            }
        }
    }
    delivered
}

/// Writes each event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        tracing::info!(
            event = event.kind.name(),
            entity = %event.entity.kind(),
            id = event.entity.external_id(),
            scope = %event.context.scope,
            parent = %event.context.parent,
            "domain event"
        );
        Ok(())
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.tx.send(event).map_err(|_| PublishError::Closed)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: DomainEvent) -> Result<(), PublishError> {
        Ok(())
    }
}
