//! Tenant scope keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies the tenant/credential context that API calls and rate-limit
/// state are tracked under.
///
/// Scopes are opaque to the engine: an installation id, an account login,
/// or any other stable key the caller uses to pick credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Create a scope from any string-like key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw scope key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for Scope {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}
