//! Cursor pagination over GraphQL connections.
//!
//! A [`Paginator`] runs one [`PaginationRequest`] to a [`TerminationReason`],
//! handing each page to a [`PageHandler`]. Only the cursor changes between
//! requests; everything else is fixed when the request is built.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::cancel::{Cancellation, Cancelled};
use crate::classify::{Classification, ErrorCategory, classify_graphql_response};
use crate::graphql::{GraphQlClient, GraphQlResponse, TransportError, Variables};
use crate::rate_limit::{ApiRateLimiter, RateLimitTracker};
use crate::retry::{RetryConfig, with_retry};
use crate::scope::Scope;

/// Variable the cursor is bound to unless configured otherwise.
pub const DEFAULT_CURSOR_VARIABLE: &str = "after";
/// Per-request timeout unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Page cap unless configured otherwise.
pub const DEFAULT_MAX_PAGES: usize = 1_000;

/// `pageInfo` of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// One page of a GraphQL connection.
///
/// `null` entries in `nodes` (deleted or inaccessible objects) are dropped
/// while decoding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Connection<T> {
    #[serde(default, deserialize_with = "skip_null_nodes")]
    pub nodes: Vec<T>,
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default)]
    pub total_count: Option<i64>,
}

fn skip_null_nodes<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let nodes: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(nodes.unwrap_or_default().into_iter().flatten().collect())
}

impl<T> Connection<T> {
    pub fn new(nodes: Vec<T>, has_next_page: bool, end_cursor: Option<String>) -> Self {
        Self {
            nodes,
            page_info: PageInfo {
                has_next_page,
                end_cursor,
            },
            total_count: None,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.page_info.has_next_page
    }

    pub fn end_cursor(&self) -> Option<&str> {
        self.page_info.end_cursor.as_deref()
    }
}

/// Why a pagination run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// The connection has no more pages.
    Completed,
    /// The page handler asked to stop.
    ProcessorStop,
    MaxPagesReached,
    /// The scope's quota is nearly exhausted.
    RateLimitCritical,
    /// The transport succeeded but the response failed validation.
    InvalidResponse,
    /// The extractor found no connection in the response.
    NullConnection,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ProcessorStop => "processor_stop",
            Self::MaxPagesReached => "max_pages_reached",
            Self::RateLimitCritical => "rate_limit_critical",
            Self::InvalidResponse => "invalid_response",
            Self::NullConnection => "null_connection",
        }
    }

    pub fn is_complete(self) -> bool {
        self == Self::Completed
    }

    pub fn is_aborted(self) -> bool {
        !matches!(self, Self::Completed | Self::ProcessorStop)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pagination run ended without an error.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationOutcome {
    pub pages_processed: usize,
    pub termination_reason: TerminationReason,
    /// Cursor the next request would have used.
    pub next_cursor: Option<String>,
    /// Why the last response was rejected, for
    /// [`TerminationReason::InvalidResponse`].
    pub classification: Option<Classification>,
}

#[derive(Debug, Error)]
pub enum PaginationError {
    /// The request was constructed incorrectly. A programming error.
    #[error("invalid pagination request: {0}")]
    InvalidRequest(String),

    /// A request failed after transport retries were exhausted.
    #[error("request failed after {pages_processed} page(s): {source}")]
    Transport {
        source: TransportError,
        cursor: Option<String>,
        pages_processed: usize,
    },

    #[error("pagination cancelled after {pages_processed} page(s)")]
    Cancelled {
        cursor: Option<String>,
        pages_processed: usize,
    },
}

/// Extracts the typed connection from a response.
pub type PageExtractor<T> =
    Box<dyn Fn(&GraphQlResponse) -> Result<Option<Connection<T>>, serde_json::Error> + Send + Sync>;

/// Consumes pages; returning `false` stops the run.
#[async_trait]
pub trait PageHandler<T: Sync>: Send {
    async fn handle_page(&mut self, page: &Connection<T>) -> bool;
}

#[async_trait]
impl<T, F> PageHandler<T> for F
where
    T: Sync,
    F: FnMut(&Connection<T>) -> bool + Send,
{
    async fn handle_page(&mut self, page: &Connection<T>) -> bool {
        (self)(page)
    }
}

/// A fully validated pagination request.
pub struct PaginationRequest<T> {
    document: String,
    variables: Variables,
    timeout: Duration,
    cursor_variable: String,
    extractor: PageExtractor<T>,
    max_pages: usize,
    initial_cursor: Option<String>,
}

impl<T> fmt::Debug for PaginationRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationRequest")
            .field("variables", &self.variables)
            .field("timeout", &self.timeout)
            .field("cursor_variable", &self.cursor_variable)
            .field("max_pages", &self.max_pages)
            .field("initial_cursor", &self.initial_cursor)
            .finish_non_exhaustive()
    }
}

impl<T> PaginationRequest<T> {
    pub fn builder(document: impl Into<String>) -> PaginationRequestBuilder<T> {
        PaginationRequestBuilder {
            document: document.into(),
            variables: Variables::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            cursor_variable: DEFAULT_CURSOR_VARIABLE.to_string(),
            extractor: None,
            max_pages: DEFAULT_MAX_PAGES,
            initial_cursor: None,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn initial_cursor(&self) -> Option<&str> {
        self.initial_cursor.as_deref()
    }

    /// Same request starting from another cursor.
    #[must_use]
    pub fn resume_from(mut self, cursor: Option<String>) -> Self {
        self.initial_cursor = cursor;
        self
    }

    /// Same request with a smaller page cap. Zero is raised to one.
    #[must_use]
    pub fn limit_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }
}

pub struct PaginationRequestBuilder<T> {
    document: String,
    variables: Variables,
    timeout: Duration,
    cursor_variable: String,
    extractor: Option<PageExtractor<T>>,
    max_pages: usize,
    initial_cursor: Option<String>,
}

impl<T> PaginationRequestBuilder<T> {
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables.extend(variables);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn cursor_variable(mut self, name: impl Into<String>) -> Self {
        self.cursor_variable = name.into();
        self
    }

    #[must_use]
    pub fn extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&GraphQlResponse) -> Result<Option<Connection<T>>, serde_json::Error>
            + Send
            + Sync
            + 'static,
    {
        self.extractor = Some(Box::new(extractor));
        self
    }

    #[must_use]
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn initial_cursor(mut self, cursor: Option<String>) -> Self {
        self.initial_cursor = cursor;
        self
    }

    /// Validate and build the request.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::InvalidRequest`] for a blank document, a
    /// zero page cap or timeout, a missing extractor, or a cursor variable
    /// that is blank or already bound.
    pub fn build(self) -> Result<PaginationRequest<T>, PaginationError> {
        let invalid = |msg: &str| Err(PaginationError::InvalidRequest(msg.to_string()));

        if self.document.trim().is_empty() {
            return invalid("document must not be blank");
        }
        if self.max_pages == 0 {
            return invalid("max_pages must be at least 1");
        }
        if self.timeout.is_zero() {
            return invalid("timeout must be positive");
        }
        if self.cursor_variable.trim().is_empty() {
            return invalid("cursor variable must not be blank");
        }
        if self.variables.contains_key(&self.cursor_variable) {
            return Err(PaginationError::InvalidRequest(format!(
                "variable `{}` is reserved for the cursor",
                self.cursor_variable
            )));
        }
        let Some(extractor) = self.extractor else {
            return invalid("a page extractor is required");
        };

        Ok(PaginationRequest {
            document: self.document,
            variables: self.variables,
            timeout: self.timeout,
            cursor_variable: self.cursor_variable,
            extractor,
            max_pages: self.max_pages,
            initial_cursor: self.initial_cursor,
        })
    }
}

impl<T: DeserializeOwned + 'static> PaginationRequestBuilder<T> {
    /// Extract the connection at a dot path below `data`.
    #[must_use]
    pub fn connection_at(self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.extractor(move |response| response.field_as::<Connection<T>>(&path))
    }
}

/// Drives one pagination request for one scope.
pub struct Paginator<'a> {
    client: &'a dyn GraphQlClient,
    tracker: &'a RateLimitTracker,
    scope: &'a Scope,
    retry: RetryConfig,
    pacer: Option<&'a ApiRateLimiter>,
    cancel: Cancellation,
}

impl<'a> Paginator<'a> {
    pub fn new(
        client: &'a dyn GraphQlClient,
        tracker: &'a RateLimitTracker,
        scope: &'a Scope,
    ) -> Self {
        Self {
            client,
            tracker,
            scope,
            retry: RetryConfig::default(),
            pacer: None,
            cancel: Cancellation::never(),
        }
    }

    /// Transport retry policy for each request.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Await a token bucket before every request.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Option<&'a ApiRateLimiter>) -> Self {
        self.pacer = pacer;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `request` until it terminates, feeding pages to `handler`.
    ///
    /// # Errors
    ///
    /// Transport failures that survive the retry policy, and cancellation,
    /// are returned with the cursor of the page that was being fetched.
    pub async fn run<T, H>(
        &self,
        request: &PaginationRequest<T>,
        handler: &mut H,
    ) -> Result<PaginationOutcome, PaginationError>
    where
        T: Send + Sync,
        H: PageHandler<T> + ?Sized,
    {
        let mut cursor = request.initial_cursor.clone();
        let mut pages = 0usize;

        loop {
            if pages >= request.max_pages {
                return Ok(self.finish(pages, TerminationReason::MaxPagesReached, cursor, None));
            }

            if self.tracker.is_critical(self.scope) {
                tracing::warn!(
                    scope = %self.scope,
                    remaining = self.tracker.remaining(self.scope),
                    "rate limit critical, stopping before next request"
                );
                return Ok(self.finish(pages, TerminationReason::RateLimitCritical, cursor, None));
            }

            let mut variables = request.variables.clone();
            variables.insert(
                request.cursor_variable.clone(),
                cursor.clone().map_or(Value::Null, Value::String),
            );

            let response = match self.cancel.run(self.fetch(request, &variables)).await {
                Err(Cancelled) => {
                    return Err(PaginationError::Cancelled {
                        cursor,
                        pages_processed: pages,
                    });
                }
                Ok(Err(source)) => {
                    return Err(PaginationError::Transport {
                        source,
                        cursor,
                        pages_processed: pages,
                    });
                }
                Ok(Ok(response)) => response,
            };

            self.tracker
                .update_from_response(Some(self.scope), Some(&response));

            if !response.is_valid() {
                let classification = classify_graphql_response(&response);
                return Ok(self.finish(
                    pages,
                    TerminationReason::InvalidResponse,
                    cursor,
                    classification,
                ));
            }
            for error in response.errors() {
                tracing::warn!(
                    scope = %self.scope,
                    kind = error.kind().unwrap_or("unknown"),
                    path = ?error.path,
                    message = %error.message,
                    "skipping inaccessible node"
                );
            }

            let connection = match (request.extractor)(&response) {
                Ok(Some(connection)) => connection,
                Ok(None) => {
                    return Ok(self.finish(pages, TerminationReason::NullConnection, cursor, None));
                }
                Err(err) => {
                    let classification = Classification::new(
                        ErrorCategory::Unknown,
                        format!("malformed connection: {err}"),
                    );
                    return Ok(self.finish(
                        pages,
                        TerminationReason::InvalidResponse,
                        cursor,
                        Some(classification),
                    ));
                }
            };

            pages += 1;
            tracing::debug!(
                scope = %self.scope,
                page = pages,
                nodes = connection.nodes.len(),
                has_next = connection.has_next_page(),
                "fetched page"
            );

            if !handler.handle_page(&connection).await {
                return Ok(self.finish(pages, TerminationReason::ProcessorStop, cursor, None));
            }

            match (connection.has_next_page(), connection.end_cursor()) {
                (false, end) => {
                    let end = end.map(str::to_string).or(cursor);
                    return Ok(self.finish(pages, TerminationReason::Completed, end, None));
                }
                (true, Some(end)) => cursor = Some(end.to_string()),
                (true, None) => {
                    let classification = Classification::new(
                        ErrorCategory::Unknown,
                        "hasNextPage without endCursor",
                    );
                    return Ok(self.finish(
                        pages,
                        TerminationReason::InvalidResponse,
                        cursor,
                        Some(classification),
                    ));
                }
            }
        }
    }

    fn finish(
        &self,
        pages: usize,
        reason: TerminationReason,
        cursor: Option<String>,
        classification: Option<Classification>,
    ) -> PaginationOutcome {
        tracing::debug!(
            scope = %self.scope,
            pages,
            reason = %reason,
            "pagination finished"
        );
        PaginationOutcome {
            pages_processed: pages,
            termination_reason: reason,
            next_cursor: cursor,
            classification,
        }
    }

    async fn fetch<T>(
        &self,
        request: &PaginationRequest<T>,
        variables: &Variables,
    ) -> Result<GraphQlResponse, TransportError> {
        let client = self.client;
        let pacer = self.pacer;
        with_retry(
            || async move {
                if let Some(pacer) = pacer {
                    pacer.wait().await;
                }
                client
                    .execute(&request.document, variables, request.timeout)
                    .await
            },
            &self.retry,
            self.scope.as_str(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffConfig;
    use crate::cancel::cancellation;
    use crate::graphql::GraphQlError;
    use crate::graphql::mock::ScriptedClient;
    use serde_json::json;

    const DOC: &str = "query($after: String) { \
        items(first: 2, after: $after) { nodes pageInfo { hasNextPage endCursor } } }";

    fn page(
        items: &[i64],
        has_next: bool,
        end: Option<&str>,
    ) -> Result<GraphQlResponse, TransportError> {
        Ok(GraphQlResponse::from_data(json!({
            "items": {
                "nodes": items,
                "pageInfo": {"hasNextPage": has_next, "endCursor": end},
                "totalCount": 6
            }
        })))
    }

    fn request() -> PaginationRequest<i64> {
        PaginationRequest::builder(DOC)
            .connection_at("items")
            .build()
            .unwrap()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(BackoffConfig::from_millis(1, 2, 0).unwrap(), 2)
    }

    fn three_pages() -> ScriptedClient {
        ScriptedClient::new(vec![
            page(&[1, 2], true, Some("c1")),
            page(&[3, 4], true, Some("c2")),
            page(&[5, 6], false, Some("c3")),
        ])
    }

    #[tokio::test]
    async fn walks_all_pages_in_order() {
        let client = three_pages();
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");
        let mut seen = Vec::new();

        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request(), &mut |page: &Connection<i64>| {
                seen.extend(page.nodes.iter().copied());
                true
            })
            .await
            .unwrap();

        assert_eq!(outcome.pages_processed, 3);
        assert_eq!(outcome.termination_reason, TerminationReason::Completed);
        assert!(outcome.termination_reason.is_complete());
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);

        let cursors: Vec<_> = client.requests().iter().map(|v| v["after"].clone()).collect();
        assert_eq!(cursors, vec![Value::Null, json!("c1"), json!("c2")]);
    }

    #[tokio::test]
    async fn starts_from_initial_cursor() {
        let client = ScriptedClient::new(vec![page(&[5, 6], false, Some("c3"))]);
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let request = request().resume_from(Some("c2".into()));
        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request, &mut |_: &Connection<i64>| true)
            .await
            .unwrap();

        assert_eq!(outcome.pages_processed, 1);
        assert_eq!(client.requests()[0]["after"], json!("c2"));
    }

    #[tokio::test]
    async fn processor_can_stop_early() {
        let client = three_pages();
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request(), &mut |page: &Connection<i64>| !page.nodes.contains(&3))
            .await
            .unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::ProcessorStop);
        assert!(!outcome.termination_reason.is_aborted());
        assert_eq!(outcome.pages_processed, 2);
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn max_pages_stops_before_fetching() {
        let client = three_pages();
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let request = PaginationRequest::builder(DOC)
            .connection_at("items")
            .max_pages(2)
            .build()
            .unwrap();
        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request, &mut |_: &Connection<i64>| true)
            .await
            .unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::MaxPagesReached);
        assert!(outcome.termination_reason.is_aborted());
        assert_eq!(outcome.pages_processed, 2);
        assert_eq!(outcome.next_cursor.as_deref(), Some("c2"));
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn critical_rate_limit_stops_before_next_request() {
        let client = ScriptedClient::new(vec![
            Ok(GraphQlResponse::from_data(json!({
                "rateLimit": {
                    "limit": 5000,
                    "cost": 1,
                    "remaining": 42,
                    "resetAt": "2099-01-01T00:00:00Z"
                },
                "items": {"nodes": [1, 2], "pageInfo": {"hasNextPage": true, "endCursor": "c1"}}
            }))),
            page(&[3, 4], false, Some("c2")),
        ]);
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request(), &mut |_: &Connection<i64>| true)
            .await
            .unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::RateLimitCritical);
        assert_eq!(outcome.pages_processed, 1);
        assert_eq!(outcome.next_cursor.as_deref(), Some("c1"));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn invalid_response_is_classified() {
        let client = ScriptedClient::new(vec![Ok(GraphQlResponse::from_errors(vec![
            GraphQlError::new(Some("NOT_FOUND"), "Could not resolve to a Repository"),
        ]))]);
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request(), &mut |_: &Connection<i64>| true)
            .await
            .unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::InvalidResponse);
        assert_eq!(
            outcome.classification.map(|c| c.category),
            Some(ErrorCategory::NotFound)
        );
        assert_eq!(outcome.pages_processed, 0);
    }

    #[tokio::test]
    async fn inaccessible_nodes_are_dropped_not_fatal() {
        let mut forbidden =
            GraphQlError::new(Some("FORBIDDEN"), "Resource not accessible by integration");
        forbidden.path = vec![json!("items"), json!("nodes"), json!(1)];
        let response = GraphQlResponse {
            errors: vec![forbidden],
            ..GraphQlResponse::from_data(json!({
                "items": {
                    "nodes": [1, null, 3],
                    "pageInfo": {"hasNextPage": false, "endCursor": "c1"}
                }
            }))
        };
        let client = ScriptedClient::new(vec![Ok(response)]);
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");
        let mut seen = Vec::new();

        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request(), &mut |page: &Connection<i64>| {
                seen.extend(page.nodes.iter().copied());
                true
            })
            .await
            .unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::Completed);
        assert_eq!(outcome.classification, None);
        assert_eq!(seen, vec![1, 3]);
    }

    #[tokio::test]
    async fn missing_connection_is_null_connection() {
        let client =
            ScriptedClient::new(vec![Ok(GraphQlResponse::from_data(json!({"items": null})))]);
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let outcome = Paginator::new(&client, &tracker, &scope)
            .run(&request(), &mut |_: &Connection<i64>| true)
            .await
            .unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::NullConnection);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_per_request() {
        let client = ScriptedClient::new(vec![
            Err(TransportError::http(502, Vec::new(), "bad gateway")),
            page(&[1, 2], false, None),
        ]);
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let outcome = Paginator::new(&client, &tracker, &scope)
            .with_retry(fast_retry())
            .run(&request(), &mut |_: &Connection<i64>| true)
            .await
            .unwrap();

        assert_eq!(outcome.pages_processed, 1);
        assert_eq!(client.requests().len(), 2);
        assert_eq!(client.requests()[1]["after"], Value::Null);
    }

    #[tokio::test]
    async fn fatal_transport_failures_surface_with_cursor() {
        let client = ScriptedClient::new(vec![
            page(&[1, 2], true, Some("c1")),
            Err(TransportError::http(401, Vec::new(), "Bad credentials")),
        ]);
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");

        let err = Paginator::new(&client, &tracker, &scope)
            .with_retry(fast_retry())
            .run(&request(), &mut |_: &Connection<i64>| true)
            .await
            .unwrap_err();

        match err {
            PaginationError::Transport {
                source,
                cursor,
                pages_processed,
            } => {
                assert_eq!(source.status(), Some(401));
                assert_eq!(cursor.as_deref(), Some("c1"));
                assert_eq!(pages_processed, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_run() {
        let client = three_pages();
        let tracker = RateLimitTracker::default();
        let scope = Scope::new("acme");
        let (handle, token) = cancellation();
        handle.cancel();

        let err = Paginator::new(&client, &tracker, &scope)
            .with_cancellation(token)
            .run(&request(), &mut |_: &Connection<i64>| true)
            .await
            .unwrap_err();

        assert!(matches!(err, PaginationError::Cancelled { pages_processed: 0, .. }));
    }

    #[test]
    fn null_nodes_are_skipped() {
        let connection: Connection<i64> = serde_json::from_value(json!({
            "nodes": [1, null, 3],
            "pageInfo": {"hasNextPage": false, "endCursor": null},
            "totalCount": 3
        }))
        .unwrap();

        assert_eq!(connection.nodes, vec![1, 3]);
        assert_eq!(connection.total_count, Some(3));
        assert_eq!(connection.end_cursor(), None);
    }

    #[test]
    fn builder_rejects_malformed_requests() {
        let cases: Vec<(&str, PaginationRequestBuilder<i64>)> = vec![
            ("blank", PaginationRequest::builder("  ").connection_at("items")),
            ("no extractor", PaginationRequest::builder(DOC)),
            (
                "zero pages",
                PaginationRequest::builder(DOC).connection_at("items").max_pages(0),
            ),
            (
                "cursor bound",
                PaginationRequest::builder(DOC)
                    .connection_at("items")
                    .variable("after", "c1"),
            ),
            (
                "zero timeout",
                PaginationRequest::builder(DOC)
                    .connection_at("items")
                    .timeout(Duration::ZERO),
            ),
        ];

        for (name, builder) in cases {
            assert!(
                matches!(builder.build(), Err(PaginationError::InvalidRequest(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn termination_reason_predicates() {
        use TerminationReason::*;
        for reason in [
            Completed,
            ProcessorStop,
            MaxPagesReached,
            RateLimitCritical,
            InvalidResponse,
            NullConnection,
        ] {
            assert_eq!(reason.is_complete(), reason == Completed);
            assert_eq!(
                reason.is_aborted(),
                !matches!(reason, Completed | ProcessorStop)
            );
        }
    }
}
