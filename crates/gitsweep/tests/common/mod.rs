//! Shared fixtures for integration tests: an in-memory database, a
//! scripted GraphQL client, and a publisher that records events.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gitsweep::events::{DomainEvent, EventPublisher, PublishError};
use gitsweep::graphql::{GraphQlError, Variables};
use gitsweep::{
    ClientResolver, CredentialError, GraphQlClient, GraphQlResponse, Scope, SyncSettings,
    TransportError, connect_and_migrate,
};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};

pub const SCOPE: &str = "acme";

pub fn scope() -> Scope {
    Scope::new(SCOPE)
}

/// Create an in-memory SQLite database with migrations applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    Arc::new(db)
}

/// Settings with millisecond backoff so retry paths finish quickly.
pub fn fast_settings() -> SyncSettings {
    let mut settings = SyncSettings::default();
    settings.backoff = gitsweep::backoff::BackoffConfig::from_millis(1, 5, 0)
        .expect("valid backoff");
    settings.rate_limit_wait_cap = Duration::from_millis(10);
    settings.transport_retries = 0;
    settings
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

// ─── Scripted client ─────────────────────────────────────────────────────────

/// Returns queued results in order and records every request.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<GraphQlResponse, TransportError>>>,
    requests: Mutex<Vec<(String, Variables)>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<GraphQlResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: Result<GraphQlResponse, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<(String, Variables)> {
        self.requests.lock().unwrap().clone()
    }

    /// The `after` variable of each request, in order.
    pub fn cursors(&self) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|(_, vars)| vars.get("after").and_then(Value::as_str).map(String::from))
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl GraphQlClient for ScriptedClient {
    async fn execute(
        &self,
        document: &str,
        variables: &Variables,
        _timeout: Duration,
    ) -> Result<GraphQlResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((document.to_string(), variables.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".into())))
    }
}

/// Hands the same scripted client to every scope.
pub struct FixedResolver(pub Arc<ScriptedClient>);

#[async_trait]
impl ClientResolver for FixedResolver {
    async fn client_for(&self, _scope: &Scope) -> Result<Arc<dyn GraphQlClient>, CredentialError> {
        let client: Arc<dyn GraphQlClient> = self.0.clone();
        Ok(client)
    }
}

/// Has no credentials for any scope.
pub struct NoCredentials;

#[async_trait]
impl ClientResolver for NoCredentials {
    async fn client_for(&self, scope: &Scope) -> Result<Arc<dyn GraphQlClient>, CredentialError> {
        Err(CredentialError::NotFound(scope.clone()))
    }
}

// ─── Publisher ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CapturingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl CapturingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(event name, external id)` pairs in publish order.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        self.events()
            .iter()
            .map(|e| (e.kind.name(), e.entity.external_id().to_string()))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventPublisher for CapturingPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

pub fn issue_json(number: i32, updated_at: DateTime<Utc>) -> Value {
    json!({
        "id": format!("I_{number}"),
        "number": number,
        "title": format!("Issue {number}"),
        "body": "body",
        "url": format!("https://github.com/acme/widgets/issues/{number}"),
        "state": "OPEN",
        "stateReason": null,
        "author": { "login": "octocat" },
        "labels": { "nodes": [{ "name": "bug" }] },
        "issueType": null,
        "createdAt": at(1, 0).to_rfc3339(),
        "updatedAt": updated_at.to_rfc3339(),
        "closedAt": null
    })
}

pub fn pull_request_json(number: i32, updated_at: DateTime<Utc>) -> Value {
    json!({
        "id": format!("PR_{number}"),
        "number": number,
        "title": format!("Pull {number}"),
        "body": null,
        "url": format!("https://github.com/acme/widgets/pull/{number}"),
        "state": "OPEN",
        "isDraft": false,
        "author": { "login": "octocat" },
        "labels": { "nodes": [] },
        "headRefName": "feature",
        "baseRefName": "main",
        "createdAt": at(1, 0).to_rfc3339(),
        "updatedAt": updated_at.to_rfc3339(),
        "closedAt": null,
        "mergedAt": null
    })
}

pub fn comment_json(id: &str, body: &str) -> Value {
    json!({
        "id": id,
        "body": body,
        "url": format!("https://github.com/acme/widgets/issues/1#{id}"),
        "author": { "login": "hubot" },
        "createdAt": at(1, 0).to_rfc3339(),
        "updatedAt": at(1, 0).to_rfc3339()
    })
}

pub fn field_json(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name, "dataType": "TEXT" })
}

pub fn item_json(id: &str) -> Value {
    json!({
        "id": id,
        "type": "ISSUE",
        "isArchived": false,
        "content": { "id": "I_1", "title": "Issue 1" },
        "fieldValues": { "nodes": [{ "text": "todo", "field": { "name": "Status" } }] },
        "createdAt": at(1, 0).to_rfc3339(),
        "updatedAt": at(2, 0).to_rfc3339()
    })
}

fn connection(nodes: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "nodes": nodes,
        "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next },
    })
}

/// A `repository.<field>` connection page. `next` is the end cursor when
/// another page follows.
pub fn repository_page(field: &str, nodes: Vec<Value>, next: Option<&str>) -> GraphQlResponse {
    let mut repository = serde_json::Map::new();
    repository.insert(field.to_string(), connection(nodes, next));
    GraphQlResponse::from_data(json!({ "repository": repository }))
}

pub fn issues_page(nodes: Vec<Value>, next: Option<&str>) -> GraphQlResponse {
    repository_page("issues", nodes, next)
}

/// A `node.<field>` connection page.
pub fn node_page(field: &str, nodes: Vec<Value>, next: Option<&str>) -> GraphQlResponse {
    let mut node = serde_json::Map::new();
    node.insert(field.to_string(), connection(nodes, next));
    GraphQlResponse::from_data(json!({ "node": node }))
}

pub fn issues_probe(count: i64) -> GraphQlResponse {
    GraphQlResponse::from_data(json!({ "repository": { "issues": { "totalCount": count } } }))
}

pub fn graphql_error(kind: &str, message: &str) -> GraphQlResponse {
    GraphQlResponse::from_errors(vec![GraphQlError::new(Some(kind), message)])
}

/// Attach a `rateLimit` block with `remaining` points and a far-off reset.
pub fn with_quota(mut response: GraphQlResponse, remaining: u32) -> GraphQlResponse {
    if let Some(Value::Object(data)) = response.data.as_mut() {
        data.insert(
            "rateLimit".into(),
            json!({
                "limit": 5000,
                "cost": 1,
                "remaining": remaining,
                "resetAt": "2099-01-01T00:00:00Z"
            }),
        );
    }
    response
}
