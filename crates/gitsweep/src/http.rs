//! HTTP-level helpers and the reqwest-backed GraphQL transport.

/// HTTP headers represented as key/value pairs.
///
/// Header names are treated case-insensitively by helper functions.
pub type HttpHeaders = Vec<(String, String)>;

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Public GitHub GraphQL endpoint.
pub const GITHUB_GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";

#[cfg(feature = "reqwest")]
pub use reqwest_transport::{ReqwestGraphQlClient, StaticTokenResolver};

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::graphql::{
        ClientResolver, CredentialError, GraphQlClient, GraphQlResponse, TransportError, Variables,
    };
    use crate::scope::Scope;

    const USER_AGENT: &str = concat!("gitsweep/", env!("CARGO_PKG_VERSION"));
    /// Longest error body kept in [`TransportError::Http`] messages.
    const MAX_ERROR_BODY: usize = 512;

    /// GraphQL client backed by reqwest with bearer-token auth.
    #[derive(Clone)]
    pub struct ReqwestGraphQlClient {
        http: reqwest::Client,
        endpoint: String,
        token: Arc<str>,
    }

    impl ReqwestGraphQlClient {
        pub fn new(
            endpoint: impl Into<String>,
            token: impl Into<String>,
        ) -> Result<Self, reqwest::Error> {
            let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
            Ok(Self::with_client(http, endpoint, token))
        }

        pub fn with_client(
            http: reqwest::Client,
            endpoint: impl Into<String>,
            token: impl Into<String>,
        ) -> Self {
            Self {
                http,
                endpoint: endpoint.into(),
                token: Arc::from(token.into()),
            }
        }
    }

    fn map_send_error(err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout(timeout);
        }
        let message = err.to_string();
        if err.is_connect() {
            if message.contains("dns error") {
                return TransportError::Dns(message);
            }
            return TransportError::Connect(message);
        }
        TransportError::Io(std::io::Error::other(err))
    }

    #[async_trait]
    impl GraphQlClient for ReqwestGraphQlClient {
        async fn execute(
            &self,
            document: &str,
            variables: &Variables,
            timeout: Duration,
        ) -> Result<GraphQlResponse, TransportError> {
            let payload = json!({ "query": document, "variables": variables });

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&*self.token)
                .timeout(timeout)
                .json(&payload)
                .send()
                .await
                .map_err(|e| map_send_error(e, timeout))?;

            let status = resp.status().as_u16();
            let mut headers: HttpHeaders = Vec::new();
            for (name, value) in resp.headers().iter() {
                headers.push((
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                ));
            }

            let body = resp.bytes().await.map_err(|e| map_send_error(e, timeout))?;

            if !(200..300).contains(&status) {
                let mut message = String::from_utf8_lossy(&body).into_owned();
                if message.len() > MAX_ERROR_BODY {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|i| message.is_char_boundary(*i))
                        .unwrap_or(0);
                    message.truncate(cut);
                }
                return Err(TransportError::http(status, headers, message));
            }

            Ok(GraphQlResponse::from_body(status, headers, &body)?)
        }
    }

    /// Resolves scopes to clients from a fixed token table.
    ///
    /// Clients are built lazily and cached per scope.
    pub struct StaticTokenResolver {
        endpoint: String,
        tokens: HashMap<Scope, String>,
        default_token: Option<String>,
        clients: Mutex<HashMap<Scope, Arc<dyn GraphQlClient>>>,
    }

    impl StaticTokenResolver {
        pub fn new(endpoint: impl Into<String>) -> Self {
            Self {
                endpoint: endpoint.into(),
                tokens: HashMap::new(),
                default_token: None,
                clients: Mutex::new(HashMap::new()),
            }
        }

        /// Register a token for one scope.
        #[must_use]
        pub fn with_token(mut self, scope: Scope, token: impl Into<String>) -> Self {
            self.tokens.insert(scope, token.into());
            self
        }

        /// Token used for scopes without an explicit entry.
        #[must_use]
        pub fn with_default_token(mut self, token: impl Into<String>) -> Self {
            self.default_token = Some(token.into());
            self
        }
    }

    #[async_trait]
    impl ClientResolver for StaticTokenResolver {
        async fn client_for(
            &self,
            scope: &Scope,
        ) -> Result<Arc<dyn GraphQlClient>, CredentialError> {
            let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(client) = clients.get(scope) {
                return Ok(Arc::clone(client));
            }

            let token = self
                .tokens
                .get(scope)
                .or(self.default_token.as_ref())
                .ok_or_else(|| CredentialError::NotFound(scope.clone()))?;

            let client = ReqwestGraphQlClient::new(self.endpoint.clone(), token.clone())
                .map_err(|e| CredentialError::Client {
                    scope: scope.clone(),
                    message: e.to_string(),
                })?;
            let client: Arc<dyn GraphQlClient> = Arc::new(client);
            clients.insert(scope.clone(), Arc::clone(&client));
            Ok(client)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn unknown_scope_without_default_token_is_not_found() {
            let resolver = StaticTokenResolver::new(GITHUB_GRAPHQL_ENDPOINT)
                .with_token(Scope::new("acme"), "t0ken");

            let err = resolver
                .client_for(&Scope::new("other"))
                .await
                .err()
                .expect("expected credential error");
            assert!(matches!(err, CredentialError::NotFound(scope) if scope.as_str() == "other"));
        }

        #[tokio::test]
        async fn resolver_caches_clients_per_scope() {
            let resolver =
                StaticTokenResolver::new(GITHUB_GRAPHQL_ENDPOINT).with_default_token("t0ken");
            let scope = Scope::new("acme");

            let first = resolver.client_for(&scope).await.unwrap();
            let second = resolver.client_for(&scope).await.unwrap();
            assert!(Arc::ptr_eq(&first, &second));
        }
    }
}
