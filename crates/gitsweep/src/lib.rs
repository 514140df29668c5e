//! gitsweep - resumable, rate-limit aware synchronization of GitHub data.
//!
//! The library mirrors issues, pull requests, comments, commits and project
//! boards into a local database through two paths that share the same
//! idempotent processors: pull-based sweeps ([`sync::SyncEngine`]) and
//! push-based webhook deliveries ([`webhook::WebhookProcessor`]).
//!
//! # Features
//!
//! - `sqlite` (default) - SQLite driver and connection pragmas.
//! - `postgres` - PostgreSQL driver.
//! - `migrate` (default) - Enables [`connect_and_migrate`] and the [`migration::Migrator`].
//! - `reqwest` (default) - [`http::ReqwestGraphQlClient`] and [`http::StaticTokenResolver`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitsweep::{Scope, SweepOptions, SyncEngine, connect_and_migrate};
//! use gitsweep::http::{GITHUB_GRAPHQL_ENDPOINT, StaticTokenResolver};
//!
//! let db = connect_and_migrate("sqlite://gitsweep.db?mode=rwc").await?;
//! let resolver =
//!     Arc::new(StaticTokenResolver::new(GITHUB_GRAPHQL_ENDPOINT).with_default_token(token));
//! let engine = SyncEngine::new(Arc::new(db), resolver);
//!
//! let result = engine
//!     .sync_issues(&Scope::new("acme"), repository_id, SweepOptions::default())
//!     .await?;
//! ```

pub mod backoff;
pub mod cancel;
pub mod classify;
pub mod db;
pub mod entity;
pub mod events;
pub mod graphql;
pub mod http;
pub mod metrics;
pub mod pagination;
pub mod processor;
pub mod queries;
pub mod rate_limit;
pub mod retry;
pub mod scope;
pub mod store;
pub mod sync;
pub mod webhook;

#[cfg(feature = "migrate")]
pub mod migration;

pub use cancel::{CancelHandle, Cancellation, Cancelled, cancellation};
pub use classify::{Classification, ErrorCategory};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use events::{DomainEvent, EventContext, EventKind, EventPublisher};
pub use graphql::{ClientResolver, CredentialError, GraphQlClient, GraphQlResponse, TransportError};
pub use rate_limit::{ApiRateLimiter, RateLimitTracker};
pub use scope::Scope;
pub use sync::{SweepOptions, SyncEngine, SyncError, SyncResult, SyncSettings, SyncStatus};
pub use webhook::{WebhookError, WebhookProcessor};

/// Result type for sweep operations.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
