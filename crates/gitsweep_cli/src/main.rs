//! gitsweep CLI - mirrors GitHub issues, pull requests, commits, comments and
//! project boards into a local database.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::commands::limits::OutputFormat;

#[derive(Parser)]
#[command(name = "gitsweep")]
#[command(version)]
#[command(about = "Mirror GitHub data into a local database")]
#[command(
    long_about = "gitsweep pages through GitHub's GraphQL API and keeps a local database of \
issues, pull requests, commits, issue comments and project items in step with it. \
Sweeps resume from checkpoints and pause when the API quota runs low."
)]
#[command(after_long_help = r#"EXAMPLES
    Track a repository and sweep its issues:
        $ gitsweep target add-repo acme rust-lang/rust
        $ gitsweep sync issues <target-id>

    Resume an interrupted pull request sweep:
        $ gitsweep sync pulls <target-id> --resume

    Re-sweep all issues and drop ones deleted upstream:
        $ gitsweep sync issues <target-id> --full

    Sweep a project board:
        $ gitsweep target add-project acme PVT_kwDOABCD --title Roadmap
        $ gitsweep sync project <target-id>

    Show the remaining API quota for a scope:
        $ gitsweep limits acme

CONFIGURATION
    gitsweep reads configuration from:
      1. ~/.config/gitsweep/config.toml (or $XDG_CONFIG_HOME/gitsweep/config.toml)
      2. ./gitsweep.toml
      3. Environment variables (GITSWEEP_* prefix, e.g., GITSWEEP_GITHUB_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITSWEEP_DATABASE_URL     Database connection string
                              (default: ~/.local/state/gitsweep/gitsweep.db)
    GITSWEEP_GITHUB_TOKEN     GitHub token used for every scope without its own entry
    RUST_LOG                  Log filter (default: gitsweep=info,gitsweep_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Manage tracked repositories and projects
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Run a sweep
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
    /// Show the API quota for a scope
    Limits {
        /// Credential scope (installation or organization key)
        scope: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Subcommand)]
enum TargetAction {
    /// Track a repository
    AddRepo {
        /// Credential scope the repository belongs to
        scope: String,
        /// Repository as owner/name
        full_name: String,
    },
    /// Track a Projects v2 board
    AddProject {
        /// Credential scope the project belongs to
        scope: String,
        /// GraphQL node id of the project (e.g., PVT_kwDOABCD)
        node_id: String,
        /// Display title
        #[arg(short, long)]
        title: Option<String>,
    },
    /// List tracked targets
    List,
}

/// Options shared by the repository sweeps.
#[derive(Debug, Clone, clap::Args)]
struct RepoSweepOptions {
    /// Tracked repository id
    target_id: Uuid,

    /// Treat this RFC 3339 time as the last sync instead of the recorded one
    #[arg(short, long)]
    since: Option<DateTime<Utc>>,

    /// Ignore the recorded last sync and sweep everything, removing stale rows
    #[arg(long, conflicts_with = "since")]
    full: bool,

    /// Checkpoint cursors and resume from one left by an interrupted run
    #[arg(short, long)]
    resume: bool,
}

#[derive(Subcommand)]
enum SyncAction {
    /// Sweep issues of a tracked repository
    Issues {
        #[command(flatten)]
        opts: RepoSweepOptions,
    },
    /// Sweep pull requests of a tracked repository
    Pulls {
        #[command(flatten)]
        opts: RepoSweepOptions,
    },
    /// Sweep default-branch commits of a tracked repository
    Commits {
        #[command(flatten)]
        opts: RepoSweepOptions,
    },
    /// Sweep the comments of one stored issue
    Comments {
        /// Credential scope
        scope: String,
        /// GraphQL node id of the issue
        issue_node_id: String,
    },
    /// Sweep fields and items of a tracked project
    Project {
        /// Tracked project id
        target_id: Uuid,

        /// Checkpoint cursors and resume from one left by an interrupted run
        #[arg(short, long)]
        resume: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("gitsweep=info,gitsweep_cli=info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    // Handle commands that don't require database access first
    if let Commands::Completions { shell } = &cli.command {
        commands::completions::handle_completions(*shell)?;
        return Ok(());
    }

    let database_url = config
        .database_url()
        .ok_or("could not determine a database URL; set GITSWEEP_DATABASE_URL")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Target { action } => {
            let db = gitsweep::connect_and_migrate(&database_url).await?;
            commands::target::handle_target(action, &db).await?;
        }
        Commands::Sync { action } => {
            let cancel = shutdown::setup_shutdown_handler();
            let db = gitsweep::connect_and_migrate(&database_url).await?;
            commands::sync::handle_sync(action, &config, Arc::new(db), cancel).await?;
        }
        Commands::Limits { scope, output } => {
            commands::limits::handle_limits(&scope, output, &config).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
