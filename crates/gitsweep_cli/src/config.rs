//! Configuration file support for gitsweep.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `GITSWEEP_`, e.g., `GITSWEEP_DATABASE_URL`)
//! 3. Config file (./gitsweep.toml, then ~/.config/gitsweep/config.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/gitsweep/gitsweep.db` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/gitsweep/gitsweep.db"  # optional, this is the default
//!
//! [github]
//! token = "ghp_..."  # or use GITSWEEP_GITHUB_TOKEN env var
//! api_url = "https://api.github.com/graphql"
//!
//! [github.tokens]
//! acme = "ghs_..."   # per-scope installation token
//!
//! [sync]
//! page_size = 50
//! max_attempts = 5
//! incremental_buffer_secs = 300
//! initial_lookback_days = 30
//! probe = true
//! reconcile = true
//!
//! [rate_limit]
//! critical_threshold = 100
//! low_threshold = 500
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use gitsweep::Scope;
use gitsweep::backoff::{self, BackoffConfig, BackoffError};
use gitsweep::http::{GITHUB_GRAPHQL_ENDPOINT, StaticTokenResolver};
use gitsweep::pagination::{DEFAULT_MAX_PAGES, DEFAULT_REQUEST_TIMEOUT};
use gitsweep::rate_limit::{self, RateLimitConfig};
use gitsweep::retry::DEFAULT_TRANSPORT_RETRIES;
use gitsweep::sync::{
    DEFAULT_INCREMENTAL_BUFFER, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_SIZE, SyncSettings,
};
use serde::Deserialize;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// GitHub credentials and endpoint.
    pub github: GitHubConfig,
    /// Sweep tuning.
    pub sync: SyncConfig,
    /// Quota thresholds.
    pub rate_limit: RateLimitSection,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Token used for scopes without their own entry.
    /// Can also be set via GITSWEEP_GITHUB_TOKEN environment variable.
    pub token: Option<String>,
    /// GraphQL endpoint; override for GitHub Enterprise.
    pub api_url: Option<String>,
    /// Per-scope tokens, keyed by scope.
    pub tokens: HashMap<String, String>,
}

/// Sweep tuning. Mirrors [`SyncSettings`] with config-friendly units.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub page_size: u32,
    pub max_pages: usize,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub transport_retries: usize,
    pub backoff_base_ms: i64,
    pub backoff_max_ms: i64,
    pub backoff_jitter_ms: i64,
    pub incremental_buffer_secs: u64,
    /// Window for a target's first sync. Unset means a full sweep.
    pub initial_lookback_days: Option<u64>,
    pub rate_limit_wait_cap_secs: u64,
    pub requests_per_second: Option<u32>,
    pub probe: bool,
    pub reconcile: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transport_retries: DEFAULT_TRANSPORT_RETRIES,
            backoff_base_ms: backoff::DEFAULT_BASE_MS,
            backoff_max_ms: backoff::DEFAULT_MAX_MS,
            backoff_jitter_ms: backoff::DEFAULT_JITTER_MS,
            incremental_buffer_secs: DEFAULT_INCREMENTAL_BUFFER.as_secs(),
            initial_lookback_days: None,
            rate_limit_wait_cap_secs: rate_limit::DEFAULT_MAX_WAIT.as_secs(),
            requests_per_second: None,
            probe: true,
            reconcile: true,
        }
    }
}

/// Quota thresholds for the rate-limit tracker.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub critical_threshold: u32,
    pub low_threshold: u32,
    pub default_limit: u32,
    pub max_wait_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            critical_threshold: rate_limit::DEFAULT_CRITICAL_THRESHOLD,
            low_threshold: rate_limit::DEFAULT_LOW_THRESHOLD,
            default_limit: rate_limit::DEFAULT_LIMIT,
            max_wait_secs: rate_limit::DEFAULT_MAX_WAIT.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/gitsweep/config.toml)
    /// 3. Local config file (./gitsweep.toml)
    /// 4. Environment variables with GITSWEEP_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "gitsweep") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("gitsweep.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gitsweep.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., GITSWEEP_DATABASE_URL -> database.url
        builder = builder.add_source(
            Environment::with_prefix("GITSWEEP")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("gitsweep.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/gitsweep` or `~/.local/state/gitsweep`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gitsweep").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    pub fn github_api_url(&self) -> String {
        self.github
            .api_url
            .clone()
            .unwrap_or_else(|| GITHUB_GRAPHQL_ENDPOINT.to_string())
    }

    /// Build the token resolver from the default and per-scope tokens.
    pub fn resolver(&self) -> StaticTokenResolver {
        let mut resolver = StaticTokenResolver::new(self.github_api_url());
        if let Some(token) = &self.github.token {
            resolver = resolver.with_default_token(token.clone());
        }
        for (scope, token) in &self.github.tokens {
            resolver = resolver.with_token(Scope::new(scope.clone()), token.clone());
        }
        resolver
    }

    /// Engine settings from the `[sync]` section.
    ///
    /// # Errors
    ///
    /// Returns an error for negative backoff values.
    pub fn sync_settings(&self) -> Result<SyncSettings, BackoffError> {
        let s = &self.sync;
        Ok(SyncSettings {
            page_size: s.page_size,
            max_pages: s.max_pages,
            request_timeout: Duration::from_secs(s.request_timeout_secs),
            max_attempts: s.max_attempts,
            backoff: BackoffConfig::from_millis(
                s.backoff_base_ms,
                s.backoff_max_ms,
                s.backoff_jitter_ms,
            )?,
            transport_retries: s.transport_retries,
            rate_limit_wait_cap: Duration::from_secs(s.rate_limit_wait_cap_secs),
            incremental_buffer: Duration::from_secs(s.incremental_buffer_secs),
            initial_lookback: s
                .initial_lookback_days
                .map(|days| Duration::from_secs(days.saturating_mul(SECS_PER_DAY))),
            probe: s.probe,
            reconcile: s.reconcile,
            requests_per_second: s.requests_per_second.filter(|rps| *rps > 0),
        })
    }

    /// Tracker thresholds from the `[rate_limit]` section.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        let r = &self.rate_limit;
        RateLimitConfig {
            critical_threshold: r.critical_threshold,
            low_threshold: r.low_threshold,
            default_limit: r.default_limit,
            max_wait: Duration::from_secs(r.max_wait_secs),
            ..RateLimitConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert!(config.github.token.is_none());
        assert!(config.github.tokens.is_empty());
        assert_eq!(config.sync.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.sync.incremental_buffer_secs, 300);
        assert!(config.sync.initial_lookback_days.is_none());
        assert!(config.sync.probe);
        assert!(config.sync.reconcile);
        assert_eq!(config.rate_limit.critical_threshold, 100);
    }

    #[test]
    fn test_config_builder_with_toml_string() {
        let config = from_toml(
            r#"
            [database]
            url = "sqlite:///tmp/test.db"

            [github]
            token = "ghp_test123"

            [github.tokens]
            acme = "ghs_acme"

            [sync]
            page_size = 25
            initial_lookback_days = 7
            probe = false
            "#,
        );

        assert_eq!(config.database.url.as_deref(), Some("sqlite:///tmp/test.db"));
        assert_eq!(config.github.token.as_deref(), Some("ghp_test123"));
        assert_eq!(
            config.github.tokens.get("acme").map(String::as_str),
            Some("ghs_acme")
        );
        assert_eq!(config.sync.page_size, 25);
        assert_eq!(config.sync.initial_lookback_days, Some(7));
        assert!(!config.sync.probe);
        // Unset fields keep their defaults.
        assert_eq!(config.sync.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_config_builder_with_defaults() {
        let settings = ConfigBuilder::builder().build().unwrap();
        let config: Config = settings.try_deserialize().unwrap_or_default();
        assert_eq!(config.sync.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.sync.reconcile);
    }

    #[test]
    fn test_sync_settings_conversion() {
        let config = from_toml(
            r#"
            [sync]
            request_timeout_secs = 10
            incremental_buffer_secs = 60
            initial_lookback_days = 2
            requests_per_second = 0
            "#,
        );
        let settings = config.sync_settings().unwrap();

        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.incremental_buffer, Duration::from_secs(60));
        assert_eq!(settings.initial_lookback, Some(Duration::from_secs(2 * 86_400)));
        // Zero disables pacing rather than building an empty bucket.
        assert_eq!(settings.requests_per_second, None);
    }

    #[test]
    fn test_negative_backoff_is_rejected() {
        let config = from_toml(
            r#"
            [sync]
            backoff_base_ms = -1
            "#,
        );
        assert!(config.sync_settings().is_err());
    }

    #[test]
    fn test_rate_limit_config_conversion() {
        let config = from_toml(
            r#"
            [rate_limit]
            critical_threshold = 50
            max_wait_secs = 60
            "#,
        );
        let limits = config.rate_limit_config();
        assert_eq!(limits.critical_threshold, 50);
        assert_eq!(limits.low_threshold, rate_limit::DEFAULT_LOW_THRESHOLD);
        assert_eq!(limits.max_wait, Duration::from_secs(60));
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        // No home directory (some CI sandboxes) means no default.
        let Some(url) = Config::default().database_url() else {
            return;
        };
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("gitsweep.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_database_url_respects_configured_value() {
        let config = from_toml(
            r#"
            [database]
            url = "postgres://localhost/gitsweep"
            "#,
        );
        assert_eq!(
            config.database_url().as_deref(),
            Some("postgres://localhost/gitsweep")
        );
    }

    #[test]
    fn test_github_api_url_default() {
        assert_eq!(Config::default().github_api_url(), GITHUB_GRAPHQL_ENDPOINT);
    }
}
