//! GitHub Projects (v2): field definitions and items.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Named, Nodes, ProcessError, Processed, Processor, diff_fields};
use crate::entity::project_field::{self, Entity as ProjectField};
use crate::entity::project_item::{self, Entity as ProjectItem};
use crate::events::{EntityKind, EventContext};

// ─── Fields ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IterationConfiguration {
    #[serde(default)]
    pub iterations: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFieldNode {
    pub id: String,
    pub name: String,
    pub data_type: String,
    /// Single-select options.
    #[serde(default)]
    pub options: Option<Vec<Value>>,
    /// Iteration fields carry their iterations here instead.
    #[serde(default)]
    pub configuration: Option<IterationConfiguration>,
}

impl ProjectFieldNode {
    fn options_json(&self) -> Value {
        match (&self.options, &self.configuration) {
            (Some(options), _) => Value::Array(options.clone()),
            (None, Some(config)) => Value::Array(config.iterations.clone()),
            (None, None) => Value::Array(Vec::new()),
        }
    }

    fn to_model(
        &self,
        id: Uuid,
        project_id: Uuid,
        synced_at: DateTime<Utc>,
    ) -> project_field::Model {
        project_field::Model {
            id,
            project_id,
            node_id: self.id.clone(),
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            options: self.options_json(),
            synced_at: synced_at.fixed_offset(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectFieldProcessor;

#[async_trait]
impl Processor for ProjectFieldProcessor {
    type Node = ProjectFieldNode;
    type Model = project_field::Model;

    const KIND: EntityKind = EntityKind::ProjectField;

    fn external_id(node: &ProjectFieldNode) -> &str {
        &node.id
    }

    /// Field definitions carry no timestamp.
    fn updated_at(_node: &ProjectFieldNode) -> Option<DateTime<Utc>> {
        None
    }

    fn model_external_id(model: &project_field::Model) -> &str {
        &model.node_id
    }

    async fn find(
        &self,
        txn: &DatabaseTransaction,
        _ctx: &EventContext,
        external_id: &str,
    ) -> Result<Option<project_field::Model>, DbErr> {
        ProjectField::find_by_node_id(external_id).one(txn).await
    }

    async fn find_all_by_parent(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
    ) -> Result<Vec<project_field::Model>, DbErr> {
        ProjectField::find_by_project(ctx.parent_id).all(txn).await
    }

    async fn delete(
        &self,
        txn: &DatabaseTransaction,
        model: &project_field::Model,
    ) -> Result<(), DbErr> {
        ProjectField::delete_by_id(model.id).exec(txn).await?;
        Ok(())
    }

    async fn process(
        &self,
        txn: &DatabaseTransaction,
        node: &ProjectFieldNode,
        ctx: &EventContext,
    ) -> Result<Processed<project_field::Model>, ProcessError> {
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

        let next = node.to_model(prev.id, prev.project_id, now);
        let changed = diff_fields!(prev, next; name, data_type, options);
        if changed.is_empty() {
            return Ok(Processed::unchanged(prev));
        }
        let model = next.into_active_model().reset_all().update(txn).await?;
        Ok(Processed::updated(model, changed, ctx))
    }
}

// ─── Items ───────────────────────────────────────────────────────────────────

/// Issue, pull request or draft issue behind an item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemContent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// One field value. Which member is set depends on the field type; value
/// types the queries do not select decode as an empty object.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FieldValueNode {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub field: Option<Named>,
}

impl FieldValueNode {
    fn value(&self) -> Option<Value> {
        if let Some(text) = &self.text {
            return Some(Value::from(text.as_str()));
        }
        if let Some(name) = &self.name {
            return Some(Value::from(name.as_str()));
        }
        if let Some(number) = self.number {
            return Some(Value::from(number));
        }
        self.date
            .as_deref()
            .or(self.title.as_deref())
            .map(Value::from)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectItemNode {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub content: Option<ItemContent>,
    #[serde(default)]
    pub field_values: Option<Nodes<FieldValueNode>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectItemNode {
    /// Field values keyed by field name.
    fn field_values_json(&self) -> Value {
        let mut values = Map::new();
        for fv in self.field_values.iter().flat_map(|n| n.nodes.iter()) {
            if let (Some(field), Some(value)) = (&fv.field, fv.value()) {
                values.insert(field.name.clone(), value);
            }
        }
        Value::Object(values)
    }

    fn to_model(
        &self,
        id: Uuid,
        project_id: Uuid,
        synced_at: DateTime<Utc>,
    ) -> project_item::Model {
        let content = self.content.as_ref();
        project_item::Model {
            id,
            project_id,
            node_id: self.id.clone(),
            item_type: self.item_type.clone(),
            is_archived: self.is_archived,
            content_node_id: content.and_then(|c| c.id.clone()),
            content_title: content.and_then(|c| c.title.clone()),
            field_values: self.field_values_json(),
            created_at: self.created_at.fixed_offset(),
            updated_at: self.updated_at.fixed_offset(),
            synced_at: synced_at.fixed_offset(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectItemProcessor;

#[async_trait]
impl Processor for ProjectItemProcessor {
    type Node = ProjectItemNode;
    type Model = project_item::Model;

    const KIND: EntityKind = EntityKind::ProjectItem;

    fn external_id(node: &ProjectItemNode) -> &str {
        &node.id
    }

    fn updated_at(node: &ProjectItemNode) -> Option<DateTime<Utc>> {
        Some(node.updated_at)
    }

    fn model_external_id(model: &project_item::Model) -> &str {
        &model.node_id
    }

    async fn find(
        &self,
        txn: &DatabaseTransaction,
        _ctx: &EventContext,
        external_id: &str,
    ) -> Result<Option<project_item::Model>, DbErr> {
        ProjectItem::find_by_node_id(external_id).one(txn).await
    }

    async fn find_all_by_parent(
        &self,
        txn: &DatabaseTransaction,
        ctx: &EventContext,
    ) -> Result<Vec<project_item::Model>, DbErr> {
        ProjectItem::find_by_project(ctx.parent_id).all(txn).await
    }

    async fn delete(
        &self,
        txn: &DatabaseTransaction,
        model: &project_item::Model,
    ) -> Result<(), DbErr> {
        ProjectItem::delete_by_id(model.id).exec(txn).await?;
        Ok(())
    }

    async fn process(
        &self,
        txn: &DatabaseTransaction,
        node: &ProjectItemNode,
        ctx: &EventContext,
    ) -> Result<Processed<project_item::Model>, ProcessError> {
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

        let next = node.to_model(prev.id, prev.project_id, now);
        let changed = diff_fields!(prev, next;
            item_type, is_archived, content_node_id, content_title,
            field_values, created_at, updated_at,
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
    fn item_field_values_are_keyed_by_field_name() {
        let node: ProjectItemNode = serde_json::from_value(serde_json::json!({
            "id": "PVTI_1",
            "type": "ISSUE",
            "isArchived": false,
            "content": {"id": "I_1", "title": "Crash"},
            "fieldValues": {"nodes": [
                {"text": "hello", "field": {"name": "Notes"}},
                {"name": "In progress", "field": {"name": "Status"}},
                {"number": 3.0, "field": {"name": "Estimate"}},
                {},
                null
            ]},
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-02T00:00:00Z"
        }))
        .unwrap();

        let model = node.to_model(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        assert_eq!(
            model.field_values,
            serde_json::json!({"Notes": "hello", "Status": "In progress", "Estimate": 3.0})
        );
        assert_eq!(model.content_node_id.as_deref(), Some("I_1"));
    }

    #[test]
    fn iteration_field_options_come_from_configuration() {
        let node: ProjectFieldNode = serde_json::from_value(serde_json::json!({
            "id": "PVTIF_1",
            "name": "Sprint",
            "dataType": "ITERATION",
            "configuration": {"iterations": [{"id": "it1", "title": "Sprint 1"}]}
        }))
        .unwrap();
        assert_eq!(node.options_json().as_array().map(Vec::len), Some(1));

        let plain: ProjectFieldNode = serde_json::from_value(serde_json::json!({
            "id": "PVTF_1", "name": "Title", "dataType": "TITLE"
        }))
        .unwrap();
        assert_eq!(plain.options_json(), serde_json::json!([]));
    }
}
