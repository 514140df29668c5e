//! GraphQL transport contract.
//!
//! The engine never talks HTTP directly. It consumes a [`GraphQlClient`]
//! that turns a document plus variables into a [`GraphQlResponse`], and a
//! [`ClientResolver`] that picks the right client for a [`Scope`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::http::{HttpHeaders, header_get};
use crate::scope::Scope;

/// Query variables. Ordered so requests are reproducible in logs and tests.
pub type Variables = BTreeMap<String, Value>;

/// Failures below the GraphQL layer: the request never produced a
/// well-formed response body.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        headers: HttpHeaders,
        message: String,
    },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    /// Convenience constructor for HTTP status failures.
    #[inline]
    pub fn http(status: u16, headers: HttpHeaders, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            headers,
            message: message.into(),
        }
    }

    /// HTTP status, if this failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    /// GitHub reports the error class here (`NOT_FOUND`, `FORBIDDEN`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQlError {
    pub fn new(error_type: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.map(str::to_string),
            ..Self::default()
        }
    }

    /// The error class, from `type` or `extensions.type`/`extensions.code`.
    pub fn kind(&self) -> Option<&str> {
        self.error_type.as_deref().or_else(|| {
            let extensions = self.extensions.as_ref()?;
            extensions
                .get("type")
                .or_else(|| extensions.get("code"))
                .and_then(Value::as_str)
        })
    }

    /// A FORBIDDEN or NOT_FOUND error pointing at one element of a list,
    /// e.g. `["repository", "issues", "nodes", 3]`. GitHub nulls that
    /// element and still returns the rest of the page.
    pub fn is_node_scoped(&self) -> bool {
        matches!(self.kind(), Some("FORBIDDEN" | "NOT_FOUND"))
            && self.path.iter().any(Value::is_u64)
    }
}

#[derive(Deserialize)]
struct ResponseBody {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

/// A transport-level successful GraphQL response.
///
/// Success at the transport layer says nothing about the payload: check
/// [`is_valid`](Self::is_valid) before trusting `data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphQlResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub data: Option<Value>,
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    /// Decode a raw response body.
    pub fn from_body(
        status: u16,
        headers: HttpHeaders,
        body: &[u8],
    ) -> Result<Self, serde_json::Error> {
        let body: ResponseBody = serde_json::from_slice(body)?;
        Ok(Self {
            status,
            headers,
            data: body.data,
            errors: body.errors.unwrap_or_default(),
        })
    }

    /// A 200 response carrying only `data`.
    pub fn from_data(data: Value) -> Self {
        Self {
            status: 200,
            data: Some(data),
            ..Self::default()
        }
    }

    /// A 200 response carrying only `errors`.
    pub fn from_errors(errors: Vec<GraphQlError>) -> Self {
        Self {
            status: 200,
            errors,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HttpHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// True when `data` is present and every reported error is confined to
    /// a single list element (see [`GraphQlError::is_node_scoped`]).
    pub fn is_valid(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_null())
            && self.errors.iter().all(GraphQlError::is_node_scoped)
    }

    pub fn errors(&self) -> &[GraphQlError] {
        &self.errors
    }

    /// Look up a dot-separated path below `data`.
    ///
    /// Numeric segments index into arrays. `null` values resolve to `None`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut current = self.data.as_ref()?;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!current.is_null()).then_some(current)
    }

    /// Deserialize the value at `path`. Absent or `null` yields `Ok(None)`.
    pub fn field_as<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        self.field(path)
            .map(|value| T::deserialize(value))
            .transpose()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }
}

/// Executes GraphQL documents against the remote API.
#[async_trait]
pub trait GraphQlClient: Send + Sync {
    async fn execute(
        &self,
        document: &str,
        variables: &Variables,
        timeout: Duration,
    ) -> Result<GraphQlResponse, TransportError>;
}

#[async_trait]
impl<C: GraphQlClient + ?Sized> GraphQlClient for Arc<C> {
    async fn execute(
        &self,
        document: &str,
        variables: &Variables,
        timeout: Duration,
    ) -> Result<GraphQlResponse, TransportError> {
        (**self).execute(document, variables, timeout).await
    }
}

/// Raised when no client can be built for a scope.
///
/// Never retried by the engine; always surfaced to the caller unchanged.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no installation or credentials configured for scope {0}")]
    NotFound(Scope),

    #[error("failed to build client for scope {scope}: {message}")]
    Client { scope: Scope, message: String },
}

/// Hands out a transport client bound to a scope's credentials.
#[async_trait]
pub trait ClientResolver: Send + Sync {
    async fn client_for(&self, scope: &Scope) -> Result<Arc<dyn GraphQlClient>, CredentialError>;
}
