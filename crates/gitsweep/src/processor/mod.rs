//! Idempotent processors: one plain value per entity kind.
//!
//! A processor turns one remote node into a stored row. It looks the row up
//! by its external id, creates it when missing, and otherwise diffs field by
//! field. Only a non-empty diff writes and emits an `Updated` event.
//! The sync engine and the webhook path share these processors.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, DbErr};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::events::{DomainEvent, EntityKind, EntitySnapshot, EventContext, EventKind};

/// Collect the names of fields that differ between two values.
macro_rules! diff_fields {
    ($old:expr, $new:expr; $($field:ident),+ $(,)?) => {{
        let mut changed = ::std::collections::BTreeSet::<&'static str>::new();
        $(
            if $old.$field != $new.$field {
                changed.insert(stringify!($field));
            }
        )+
        changed
    }};
}
pub(crate) use diff_fields;

pub mod comment;
pub mod commit;
pub mod issue;
pub mod project;
pub mod pull_request;

pub use comment::{CommentNode, CommentProcessor};
pub use commit::{CommitNode, CommitProcessor};
pub use issue::{IssueNode, IssueProcessor};
pub use project::{ProjectFieldNode, ProjectFieldProcessor, ProjectItemNode, ProjectItemProcessor};
pub use pull_request::{PullRequestNode, PullRequestProcessor};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("storage error: {0}")]
    Database(#[from] DbErr),

    #[error("could not encode entity: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a `process` call did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

/// The stored row after processing, plus the events to publish.
#[derive(Debug, Clone)]
pub struct Processed<M> {
    pub model: M,
    pub outcome: Outcome,
    pub events: Vec<DomainEvent>,
}

impl<M: Clone + Into<EntitySnapshot>> Processed<M> {
    pub(crate) fn created(model: M, ctx: &EventContext) -> Self {
        let event = DomainEvent::new(EventKind::Created, model.clone(), ctx.clone());
        Self {
            model,
            outcome: Outcome::Created,
            events: vec![event],
        }
    }

    pub(crate) fn updated(model: M, changed: BTreeSet<&'static str>, ctx: &EventContext) -> Self {
        let event = DomainEvent::new(EventKind::Updated { changed }, model.clone(), ctx.clone());
        Self {
            model,
            outcome: Outcome::Updated,
            events: vec![event],
        }
    }

    pub(crate) fn unchanged(model: M) -> Self {
        Self {
            model,
            outcome: Outcome::Unchanged,
            events: Vec::new(),
        }
    }

    /// Append a lifecycle event carrying the current snapshot.
    pub(crate) fn with_event(mut self, kind: EventKind, ctx: &EventContext) -> Self {
        self.events
            .push(DomainEvent::new(kind, self.model.clone(), ctx.clone()));
        self
    }

    pub fn changed(&self) -> bool {
        self.outcome != Outcome::Unchanged
    }
}

/// Create-or-update for one entity kind.
///
/// Implementors provide lookups and the base `process`; deletion and stale
/// reconciliation are derived from them.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Remote representation, decoded from a connection page.
    type Node: DeserializeOwned + Send + Sync + 'static;
    /// Stored row.
    type Model: Clone + Send + Sync + Into<EntitySnapshot>;

    const KIND: EntityKind;

    fn external_id(node: &Self::Node) -> &str;

    /// Remote last-modified time, when the kind has one.
    fn updated_at(node: &Self::Node) -> Option<DateTime<Utc>>;

    fn model_external_id(model: &Self::Model) -> &str;

    async fn find(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
        external_id: &str,
    ) -> Result<Option<Self::Model>, DbErr>;

    async fn find_all_by_parent(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
    ) -> Result<Vec<Self::Model>, DbErr>;

    async fn delete(&self, txn: &DatabaseTransaction, model: &Self::Model) -> Result<(), DbErr>;

    async fn process(
        &self,
        txn: &DatabaseTransaction,
        node: &Self::Node,
        ctx: &EventContext,
    ) -> Result<Processed<Self::Model>, ProcessError>;

    /// Remove the stored row for `node`, if any.
    async fn process_deleted(
        &self,
        txn: &DatabaseTransaction,
        node: &Self::Node,
        ctx: &EventContext,
    ) -> Result<Option<DomainEvent>, ProcessError> {
        self.delete_by_external_id(txn, Self::external_id(node), ctx)
            .await
    }

    async fn delete_by_external_id(
        &self,
        txn: &DatabaseTransaction,
        external_id: &str,
        ctx: &EventContext,
    ) -> Result<Option<DomainEvent>, ProcessError> {
        let Some(model) = self.find(txn, ctx, external_id).await? else {
            return Ok(None);
        };
        self.delete(txn, &model).await?;
        Ok(Some(DomainEvent::new(EventKind::Deleted, model, ctx.clone())))
    }

    /// Delete every stored child of the context's parent that is not in `seen`.
    async fn reconcile(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
        seen: &HashSet<String>,
    ) -> Result<Vec<DomainEvent>, ProcessError> {
        let mut events = Vec::new();
        for model in self.find_all_by_parent(txn, ctx).await? {
            if seen.contains(Self::model_external_id(&model)) {
                continue;
            }
            self.delete(txn, &model).await?;
            events.push(DomainEvent::new(EventKind::Deleted, model, ctx.clone()));
        }
        if !events.is_empty() {
            tracing::info!(
                kind = %Self::KIND,
                parent = %ctx.parent,
                deleted = events.len(),
                "reconciled stale entities"
            );
        }
        Ok(events)
    }
}

// ─── Shared node shapes ──────────────────────────────────────────────────────

/// `{ login }` of a user, bot or mannequin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Actor {
    pub login: String,
}

/// Any `{ name }` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Named {
    pub name: String,
}

/// A nested, unpaginated `{ nodes }` list. `null` entries are dropped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Nodes<T> {
    #[serde(default, deserialize_with = "nodes_skipping_null")]
    pub nodes: Vec<T>,
}

impl<T> Default for Nodes<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

fn nodes_skipping_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items.unwrap_or_default().into_iter().flatten().collect())
}

/// Sorted label names as a JSON array.
pub(crate) fn label_json(labels: Option<&Nodes<Named>>) -> serde_json::Value {
    let mut names: Vec<&str> = labels
        .map(|l| l.nodes.iter().map(|n| n.name.as_str()).collect())
        .unwrap_or_default();
    names.sort_unstable();
    names.dedup();
    serde_json::Value::from(names)
}

pub(crate) fn login(actor: Option<&Actor>) -> Option<String> {
    actor.map(|a| a.login.clone())
}
