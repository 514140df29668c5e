use std::sync::Arc;

use chrono::{DateTime, Utc};
use gitsweep::entity::{tracked_project, tracked_repository};
use gitsweep::store::watermark;
use gitsweep::sync::{SweepOptions, SyncEngine, SyncResult, SyncStatus, target};
use gitsweep::{Cancellation, RateLimitTracker, Scope};
use sea_orm::{DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::config::Config;
use crate::progress::LoggingReporter;
use crate::{RepoSweepOptions, SyncAction};

/// Repository sweeps the CLI can run.
#[derive(Debug, Clone, Copy)]
enum RepoSweep {
    Issues,
    Pulls,
    Commits,
}

impl RepoSweep {
    fn label(self) -> &'static str {
        match self {
            RepoSweep::Issues => "issues",
            RepoSweep::Pulls => "pulls",
            RepoSweep::Commits => "commits",
        }
    }
}

pub(crate) async fn handle_sync(
    action: SyncAction,
    config: &Config,
    db: Arc<DatabaseConnection>,
    cancel: Cancellation,
) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = LoggingReporter::new();
    let engine = SyncEngine::new(db, Arc::new(config.resolver()))
        .with_settings(config.sync_settings()?)
        .with_tracker(Arc::new(RateLimitTracker::new(config.rate_limit_config())))
        .with_progress(Box::new(move |event| reporter.handle(event)))
        .with_cancellation(cancel);

    match action {
        SyncAction::Issues { opts } => {
            sync_repository(&engine, RepoSweep::Issues, opts).await?;
            Ok(())
        }
        SyncAction::Pulls { opts } => {
            sync_repository(&engine, RepoSweep::Pulls, opts).await?;
            Ok(())
        }
        SyncAction::Commits { opts } => {
            sync_repository(&engine, RepoSweep::Commits, opts).await?;
            Ok(())
        }
        SyncAction::Comments {
            scope,
            issue_node_id,
        } => {
            let result = engine
                .sync_comments(&Scope::new(scope), &issue_node_id, SweepOptions::default())
                .await?;
            print_result(&format!("comments of {issue_node_id}"), &result);
            Ok(())
        }
        SyncAction::Project { target_id, resume } => {
            sync_project(&engine, target_id, resume).await
        }
    }
}

async fn sync_repository(
    engine: &SyncEngine,
    sweep: RepoSweep,
    opts: RepoSweepOptions,
) -> Result<SyncResult, Box<dyn std::error::Error>> {
    let repo = tracked_repository::Entity::find_by_id(opts.target_id)
        .one(engine.database())
        .await?
        .ok_or_else(|| format!("No tracked repository with id {}", opts.target_id))?;
    let scope = Scope::new(repo.scope.clone());
    let key = checkpoint_id(repo.id, sweep.label());

    let recorded = watermark::last_synced(engine.database(), &key).await?;
    let options = sweep_options(&opts, &key, recorded);

    let started = Utc::now();
    let result = match sweep {
        RepoSweep::Issues => engine.sync_issues(&scope, repo.id, options).await?,
        RepoSweep::Pulls => engine.sync_pull_requests(&scope, repo.id, options).await?,
        RepoSweep::Commits => engine.sync_commits(&scope, repo.id, options).await?,
    };

    print_result(&format!("{} of {}", sweep.label(), repo.full_name()), &result);
    if result.status == SyncStatus::Completed {
        watermark::record_synced(engine.database(), &key, started).await?;
        target::mark_repository_synced(engine.database(), repo.id).await?;
    }
    Ok(result)
}

/// Options for one repository sweep given its own recorded watermark.
///
/// `--full` drops the bound entirely so the sweep reconciles.
fn sweep_options(
    opts: &RepoSweepOptions,
    key: &str,
    recorded: Option<DateTime<Utc>>,
) -> SweepOptions {
    let mut options = SweepOptions::default();
    if opts.resume {
        options = options.resumable(key);
    }
    let last_sync = if opts.full {
        None
    } else {
        opts.since.or(recorded)
    };
    if let Some(last_sync) = last_sync {
        options = options.since_last_sync(last_sync);
    }
    options
}

async fn sync_project(
    engine: &SyncEngine,
    target_id: Uuid,
    resume: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = tracked_project::Entity::find_by_id(target_id)
        .one(engine.database())
        .await?
        .ok_or_else(|| format!("No tracked project with id {target_id}"))?;
    let scope = Scope::new(project.scope.clone());

    let mut options = SweepOptions::default();
    if resume {
        options = options.resumable(checkpoint_id(project.id, "project"));
    }
    if let Some(last_sync) = project.last_synced_at {
        options = options.since_last_sync(last_sync.to_utc());
    }

    let result = engine.sync_project(&scope, project.id, options).await?;

    let label = project.title.as_deref().unwrap_or(&project.node_id);
    print_result(&format!("project {label}"), &result);
    if result.status == SyncStatus::Completed {
        target::mark_project_synced(engine.database(), project.id).await?;
    }
    Ok(())
}

/// Checkpoint key for one sweep kind of one target.
fn checkpoint_id(target_id: Uuid, sweep: &str) -> String {
    format!("{target_id}:{sweep}")
}

fn print_result(what: &str, result: &SyncResult) {
    println!(
        "Synced {}: {} processed, {} deleted over {} page(s) [{}]",
        what, result.count, result.deleted, result.pages, result.status
    );
    for (phase, ok) in &result.phases {
        println!("  {}: {}", phase, if *ok { "ok" } else { "failed" });
    }
    if result.status.is_aborted() {
        eprintln!(
            "Sweep did not finish; sweeps run with --resume continue from their last checkpoint."
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use gitsweep::entity::issue::Entity as Issue;
    use gitsweep::entity::pull_request::Entity as PullRequest;
    use gitsweep::graphql::Variables;
    use gitsweep::{
        ClientResolver, CredentialError, GraphQlClient, GraphQlResponse, SyncSettings,
        TransportError,
    };
    use sea_orm::PaginatorTrait;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<GraphQlResponse>>,
        documents: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn push(&self, response: GraphQlResponse) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn documents(&self) -> Vec<String> {
            self.documents.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GraphQlClient for Scripted {
        async fn execute(
            &self,
            document: &str,
            _variables: &Variables,
            _timeout: Duration,
        ) -> Result<GraphQlResponse, TransportError> {
            self.documents.lock().unwrap().push(document.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Connect("script exhausted".into()))
        }
    }

    struct Resolver(Arc<Scripted>);

    #[async_trait]
    impl ClientResolver for Resolver {
        async fn client_for(
            &self,
            _scope: &Scope,
        ) -> Result<Arc<dyn GraphQlClient>, CredentialError> {
            let client: Arc<dyn GraphQlClient> = self.0.clone();
            Ok(client)
        }
    }

    fn opts(target_id: Uuid) -> RepoSweepOptions {
        RepoSweepOptions {
            target_id,
            since: None,
            full: false,
            resume: false,
        }
    }

    fn page(field: &str, nodes: Vec<Value>) -> GraphQlResponse {
        GraphQlResponse::from_data(json!({
            "repository": {
                field: { "nodes": nodes, "pageInfo": { "hasNextPage": false, "endCursor": null } }
            }
        }))
    }

    fn issue(number: i32) -> Value {
        json!({
            "id": format!("I_{number}"),
            "number": number,
            "title": format!("Issue {number}"),
            "body": null,
            "url": format!("https://github.com/acme/widgets/issues/{number}"),
            "state": "OPEN",
            "stateReason": null,
            "author": { "login": "octocat" },
            "labels": { "nodes": [] },
            "issueType": null,
            "createdAt": "2026-03-01T00:00:00Z",
            "updatedAt": "2026-03-02T00:00:00Z",
            "closedAt": null
        })
    }

    fn pull_request(number: i32) -> Value {
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
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-02T00:00:00Z",
            "closedAt": null,
            "mergedAt": null
        })
    }

    async fn setup() -> (SyncEngine, Arc<Scripted>, Uuid) {
        let db = gitsweep::connect_and_migrate("sqlite::memory:").await.unwrap();
        let repo = target::track_repository(&db, &Scope::new("acme"), "acme/widgets")
            .await
            .unwrap();
        let client = Arc::new(Scripted::default());
        let engine = SyncEngine::new(Arc::new(db), Arc::new(Resolver(client.clone())))
            .with_settings(SyncSettings::default());
        (engine, client, repo.id)
    }

    #[test]
    fn checkpoint_ids_are_distinct_per_sweep() {
        let id = Uuid::nil();
        assert_eq!(
            checkpoint_id(id, RepoSweep::Issues.label()),
            "00000000-0000-0000-0000-000000000000:issues"
        );
        assert_ne!(
            checkpoint_id(id, RepoSweep::Pulls.label()),
            checkpoint_id(id, RepoSweep::Commits.label())
        );
    }

    #[test]
    fn sweep_options_prefer_explicit_since_and_full_clears_it() {
        let recorded = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let explicit = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let mut o = opts(Uuid::nil());

        assert_eq!(sweep_options(&o, "k", Some(recorded)).last_sync, Some(recorded));
        assert_eq!(sweep_options(&o, "k", None).last_sync, None);

        o.since = Some(explicit);
        assert_eq!(sweep_options(&o, "k", Some(recorded)).last_sync, Some(explicit));

        o.since = None;
        o.full = true;
        o.resume = true;
        let options = sweep_options(&o, "k", Some(recorded));
        assert_eq!(options.last_sync, None);
        assert_eq!(options.sync_target_id.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn issue_sync_does_not_bound_first_pull_sync() {
        let (engine, client, repo_id) = setup().await;

        client.push(page("issues", vec![issue(1)]));
        let issues = sync_repository(&engine, RepoSweep::Issues, opts(repo_id))
            .await
            .unwrap();
        assert_eq!(issues.status, SyncStatus::Completed);

        // Pull requests last updated long before the issue sweep still land.
        client.push(page("pullRequests", vec![pull_request(1), pull_request(2)]));
        let pulls = sync_repository(&engine, RepoSweep::Pulls, opts(repo_id))
            .await
            .unwrap();
        assert_eq!(pulls.status, SyncStatus::Completed);
        assert_eq!(pulls.count, 2);
        assert_eq!(PullRequest::find().count(engine.database()).await.unwrap(), 2);

        // Neither first sweep was preceded by a count probe.
        let documents = client.documents();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1], gitsweep::queries::PULL_REQUESTS);

        let db = engine.database();
        assert!(
            watermark::last_synced(db, &checkpoint_id(repo_id, "issues"))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            watermark::last_synced(db, &checkpoint_id(repo_id, "pulls"))
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(
            watermark::last_synced(db, &checkpoint_id(repo_id, "commits"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn full_sync_removes_issues_deleted_upstream() {
        let (engine, client, repo_id) = setup().await;

        client.push(page("issues", vec![issue(1), issue(2)]));
        sync_repository(&engine, RepoSweep::Issues, opts(repo_id))
            .await
            .unwrap();
        assert_eq!(Issue::find().count(engine.database()).await.unwrap(), 2);

        client.push(page("issues", vec![issue(1)]));
        let mut full = opts(repo_id);
        full.full = true;
        let result = sync_repository(&engine, RepoSweep::Issues, full)
            .await
            .unwrap();

        assert_eq!(result.status, SyncStatus::Completed);
        assert_eq!(result.deleted, 1);
        assert_eq!(Issue::find().count(engine.database()).await.unwrap(), 1);
        // Straight to the page query, no probe.
        assert_eq!(client.documents()[1], gitsweep::queries::ISSUES);
    }
}
