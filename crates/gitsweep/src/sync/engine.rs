//! The sync orchestrator.
//!
//! One generic sweep drives every entity kind: resolve the target, probe for
//! changes, page through the connection with one local transaction per page,
//! checkpoint the cursor, retry failed pages within an attempt budget, and
//! reconcile stale rows once a full sweep completes.
//!
//! # Example
//!
//! ```ignore
//! use gitsweep::sync::{SweepOptions, SyncEngine};
//!
//! let engine = SyncEngine::new(Arc::new(db), resolver);
//! let result = engine
//!     .sync_issues(&scope, repository_id, SweepOptions::default().resumable("r1:issues"))
//!     .await?;
//! println!("{} issues, status {}", result.count, result.status);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use serde_json::Value;
use uuid::Uuid;

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::target;
use super::types::{SweepOptions, SyncError, SyncResult, SyncSettings, SyncStatus};
use crate::backoff;
use crate::cancel::Cancellation;
use crate::classify::{Classification, ErrorCategory, classify_with_details};
use crate::events::{EntityKind, EventContext, EventPublisher, TracingPublisher, publish_all};
use crate::graphql::{ClientResolver, GraphQlClient, Variables};
use crate::metrics;
use crate::pagination::{
    Connection, PageHandler, PaginationError, PaginationOutcome, PaginationRequest, Paginator,
    TerminationReason,
};
use crate::processor::{
    CommentProcessor, CommitProcessor, IssueProcessor, ProcessError, Processor,
    ProjectFieldProcessor, ProjectItemProcessor, PullRequestProcessor,
};
use crate::queries;
use crate::rate_limit::{ApiRateLimiter, RateLimitTracker};
use crate::retry::{RetryConfig, with_retry};
use crate::scope::Scope;
use crate::store::{CheckpointStore, DbCheckpointStore};

/// Runs sweeps against one database with shared rate-limit state.
pub struct SyncEngine {
    db: Arc<DatabaseConnection>,
    resolver: Arc<dyn ClientResolver>,
    checkpoints: Arc<dyn CheckpointStore>,
    publisher: Arc<dyn EventPublisher>,
    tracker: Arc<RateLimitTracker>,
    settings: SyncSettings,
    pacer: Option<ApiRateLimiter>,
    progress: Option<ProgressCallback>,
    cancel: Cancellation,
}

impl SyncEngine {
    /// Engine with database checkpoints, logged events and default settings.
    pub fn new(db: Arc<DatabaseConnection>, resolver: Arc<dyn ClientResolver>) -> Self {
        let checkpoints = Arc::new(DbCheckpointStore::new(Arc::clone(&db)));
        Self {
            db,
            resolver,
            checkpoints,
            publisher: Arc::new(TracingPublisher),
            tracker: Arc::new(RateLimitTracker::default()),
            settings: SyncSettings::default(),
            pacer: None,
            progress: None,
            cancel: Cancellation::never(),
        }
    }

    #[must_use]
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Share quota state with other engines using the same scopes.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<RateLimitTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.pacer = settings.requests_per_second.map(ApiRateLimiter::new);
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    // ─── Entry points ────────────────────────────────────────────────────────

    /// Sweep a tracked repository's issues.
    ///
    /// # Errors
    ///
    /// Credential failures, fatal classifications and malformed requests.
    /// Every other failure is reported through [`SyncResult::status`].
    #[tracing::instrument(skip(self, options), fields(scope = %scope, kind = "issues"))]
    pub async fn sync_issues(
        &self,
        scope: &Scope,
        repository_id: Uuid,
        options: SweepOptions,
    ) -> Result<SyncResult, SyncError> {
        let repo = match target::resolve_repository(&self.db, scope, repository_id).await {
            Ok(Some(repo)) => repo,
            Ok(None) => return Ok(self.unresolved(EntityKind::Issue)),
            Err(e) => return Ok(self.resolution_failed(EntityKind::Issue, e)),
        };
        let client = self.resolver.client_for(scope).await?;
        let since = self.settings.since(options.last_sync, Utc::now());

        let mut variables = repo_variables(&repo.owner, &repo.name);
        let probe = since.map(|since| {
            let mut vars = variables.clone();
            vars.insert("since".into(), Value::from(timestamp(since)));
            Probe {
                document: queries::ISSUES_PROBE,
                variables: vars,
                count_path: "repository.issues.totalCount",
            }
        });
        if let Some(since) = since {
            variables.insert("since".into(), Value::from(timestamp(since)));
        }

        let plan = SweepPlan {
            client,
            scope: scope.clone(),
            ctx: EventContext::sync(scope.clone(), repo.id, repo.full_name()),
            document: queries::ISSUES,
            connection_path: "repository.issues",
            variables,
            since_mode: SinceMode::Server,
            since,
            probe,
            reconcile: true,
            checkpoint_id: options.sync_target_id,
            initial_cursor: options.initial_cursor,
        };
        self.run_sweep(&IssueProcessor, plan).await
    }

    /// Sweep a tracked repository's pull requests.
    ///
    /// Pull requests are fetched newest-updated first and the sweep stops at
    /// the first one older than `since`.
    #[tracing::instrument(skip(self, options), fields(scope = %scope, kind = "pull_requests"))]
    pub async fn sync_pull_requests(
        &self,
        scope: &Scope,
        repository_id: Uuid,
        options: SweepOptions,
    ) -> Result<SyncResult, SyncError> {
        let repo = match target::resolve_repository(&self.db, scope, repository_id).await {
            Ok(Some(repo)) => repo,
            Ok(None) => return Ok(self.unresolved(EntityKind::PullRequest)),
            Err(e) => return Ok(self.resolution_failed(EntityKind::PullRequest, e)),
        };
        let client = self.resolver.client_for(scope).await?;
        let since = self.settings.since(options.last_sync, Utc::now());

        let probe = since.map(|since| {
            let query = format!(
                "repo:{}/{} is:pr updated:>={}",
                repo.owner,
                repo.name,
                timestamp(since)
            );
            let mut vars = Variables::new();
            vars.insert("query".into(), Value::from(query));
            Probe {
                document: queries::PULL_REQUESTS_PROBE,
                variables: vars,
                count_path: "search.issueCount",
            }
        });

        let plan = SweepPlan {
            client,
            scope: scope.clone(),
            ctx: EventContext::sync(scope.clone(), repo.id, repo.full_name()),
            document: queries::PULL_REQUESTS,
            connection_path: "repository.pullRequests",
            variables: repo_variables(&repo.owner, &repo.name),
            since_mode: SinceMode::Client,
            since,
            probe,
            reconcile: true,
            checkpoint_id: options.sync_target_id,
            initial_cursor: options.initial_cursor,
        };
        self.run_sweep(&PullRequestProcessor, plan).await
    }

    /// Sweep the default branch history of a tracked repository.
    ///
    /// Commits are never reconciled.
    #[tracing::instrument(skip(self, options), fields(scope = %scope, kind = "commits"))]
    pub async fn sync_commits(
        &self,
        scope: &Scope,
        repository_id: Uuid,
        options: SweepOptions,
    ) -> Result<SyncResult, SyncError> {
        let repo = match target::resolve_repository(&self.db, scope, repository_id).await {
            Ok(Some(repo)) => repo,
            Ok(None) => return Ok(self.unresolved(EntityKind::Commit)),
            Err(e) => return Ok(self.resolution_failed(EntityKind::Commit, e)),
        };
        let client = self.resolver.client_for(scope).await?;
        let since = self.settings.since(options.last_sync, Utc::now());

        let mut variables = repo_variables(&repo.owner, &repo.name);
        if let Some(since) = since {
            variables.insert("since".into(), Value::from(timestamp(since)));
        }
        let probe = since.map(|_| Probe {
            document: queries::COMMITS_PROBE,
            variables: variables.clone(),
            count_path: "repository.defaultBranchRef.target.history.totalCount",
        });

        let plan = SweepPlan {
            client,
            scope: scope.clone(),
            ctx: EventContext::sync(scope.clone(), repo.id, repo.full_name()),
            document: queries::COMMITS,
            connection_path: "repository.defaultBranchRef.target.history",
            variables,
            since_mode: SinceMode::Server,
            since,
            probe,
            reconcile: false,
            checkpoint_id: options.sync_target_id,
            initial_cursor: options.initial_cursor,
        };
        self.run_sweep(&CommitProcessor, plan).await
    }

    /// Sweep every comment of one stored issue.
    #[tracing::instrument(skip(self, options), fields(scope = %scope, kind = "issue_comments"))]
    pub async fn sync_comments(
        &self,
        scope: &Scope,
        issue_node_id: &str,
        options: SweepOptions,
    ) -> Result<SyncResult, SyncError> {
        let (issue, repo) = match target::resolve_issue(&self.db, scope, issue_node_id).await {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(self.unresolved(EntityKind::IssueComment)),
            Err(e) => return Ok(self.resolution_failed(EntityKind::IssueComment, e)),
        };
        let client = self.resolver.client_for(scope).await?;

        let plan = SweepPlan {
            client,
            scope: scope.clone(),
            ctx: EventContext::sync(
                scope.clone(),
                issue.id,
                format!("{}#{}", repo.full_name(), issue.number),
            ),
            document: queries::ISSUE_COMMENTS,
            connection_path: "node.comments",
            variables: node_variables(&issue.node_id),
            since_mode: SinceMode::Unsupported,
            since: None,
            probe: None,
            reconcile: true,
            checkpoint_id: options.sync_target_id,
            initial_cursor: options.initial_cursor,
        };
        self.run_sweep(&CommentProcessor, plan).await
    }

    /// Sweep a project's field definitions, then its items.
    ///
    /// Each phase checkpoints under `{sync_target_id}:fields` and
    /// `{sync_target_id}:items`. An explicit initial cursor applies to the
    /// items phase only.
    #[tracing::instrument(skip(self, options), fields(scope = %scope, kind = "project"))]
    pub async fn sync_project(
        &self,
        scope: &Scope,
        project_id: Uuid,
        options: SweepOptions,
    ) -> Result<SyncResult, SyncError> {
        let project = match target::resolve_project(&self.db, scope, project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => return Ok(self.unresolved(EntityKind::ProjectItem)),
            Err(e) => return Ok(self.resolution_failed(EntityKind::ProjectItem, e)),
        };
        let client = self.resolver.client_for(scope).await?;
        let label = project.title.clone().unwrap_or_else(|| project.node_id.clone());
        let ctx = EventContext::sync(scope.clone(), project.id, label);
        let phase_checkpoint =
            |phase: &str| options.sync_target_id.as_ref().map(|id| format!("{id}:{phase}"));

        let fields = SweepPlan {
            client: Arc::clone(&client),
            scope: scope.clone(),
            ctx: ctx.clone(),
            document: queries::PROJECT_FIELDS,
            connection_path: "node.fields",
            variables: node_variables(&project.node_id),
            since_mode: SinceMode::Unsupported,
            since: None,
            probe: None,
            reconcile: true,
            checkpoint_id: phase_checkpoint("fields"),
            initial_cursor: None,
        };
        let fields = self.run_sweep(&ProjectFieldProcessor, fields).await?;
        if fields.status == SyncStatus::AbortedRateLimit {
            tracing::warn!(
                scope = %scope,
                project = %project.node_id,
                "quota exhausted during fields phase, skipping items"
            );
            let skipped = SyncResult::new(SyncStatus::AbortedRateLimit, 0);
            return Ok(combine_phases(&fields, &skipped));
        }

        let items = SweepPlan {
            client,
            scope: scope.clone(),
            ctx,
            document: queries::PROJECT_ITEMS,
            connection_path: "node.items",
            variables: node_variables(&project.node_id),
            since_mode: SinceMode::Unsupported,
            since: None,
            probe: None,
            reconcile: true,
            checkpoint_id: phase_checkpoint("items"),
            initial_cursor: options.initial_cursor,
        };
        let items = self.run_sweep(&ProjectItemProcessor, items).await?;

        Ok(combine_phases(&fields, &items))
    }

    // ─── Generic sweep ───────────────────────────────────────────────────────

    async fn run_sweep<P: Processor>(
        &self,
        processor: &P,
        plan: SweepPlan,
    ) -> Result<SyncResult, SyncError> {
        let kind = P::KIND;
        let target = plan.ctx.parent.clone();

        let restored = match (&plan.initial_cursor, &plan.checkpoint_id) {
            (Some(_), _) | (None, None) => None,
            (None, Some(id)) => match self.checkpoints.get(id).await {
                Ok(cursor) => cursor,
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        checkpoint = %id,
                        error = %e,
                        "could not read checkpoint, starting over"
                    );
                    None
                }
            },
        };
        let start_cursor = plan.initial_cursor.clone().or(restored);
        let full_sweep = start_cursor.is_none() && plan.since.is_none();

        tracing::info!(
            kind = %kind,
            target = %target,
            cursor = ?start_cursor,
            since = ?plan.since,
            "starting sweep"
        );
        emit(
            self.progress.as_ref(),
            SyncProgress::SweepStarted {
                kind,
                target: target.clone(),
                resume_cursor: start_cursor.clone(),
                since: plan.since,
            },
        );

        if start_cursor.is_none() && self.settings.probe {
            if let Some(probe) = &plan.probe {
                if self.probe_is_empty(kind, &target, &plan, probe).await {
                    emit(
                        self.progress.as_ref(),
                        SyncProgress::ProbeSkipped {
                            kind,
                            target: target.clone(),
                        },
                    );
                    return Ok(self.finish(kind, &target, SyncResult::empty()));
                }
            }
        }

        let mut handler = SweepHandler {
            db: self.db.as_ref(),
            processor,
            ctx: &plan.ctx,
            publisher: self.publisher.as_ref(),
            checkpoints: self.checkpoints.as_ref(),
            checkpoint_id: plan.checkpoint_id.as_deref(),
            progress: self.progress.as_ref(),
            client_since: match plan.since_mode {
                SinceMode::Client => plan.since,
                _ => None,
            },
            seen: HashSet::new(),
            count: 0,
            pages: 0,
            reached_since: false,
            failure: None,
        };

        let paginator = Paginator::new(plan.client.as_ref(), &self.tracker, &plan.scope)
            .with_retry(RetryConfig::new(
                self.settings.backoff,
                self.settings.transport_retries,
            ))
            .with_pacer(self.pacer.as_ref())
            .with_cancellation(self.cancel.clone());

        let mut cursor = start_cursor.clone();
        let mut attempts = 0u32;
        let status = loop {
            if self.tracker.wait_if_needed(&plan.scope, &self.cancel).await.is_err() {
                tracing::warn!(
                    kind = %kind,
                    target = %target,
                    "sweep cancelled while waiting for quota"
                );
                break SyncStatus::AbortedError;
            }

            let remaining_pages = self.settings.max_pages.saturating_sub(handler.pages);
            if remaining_pages == 0 {
                break SyncStatus::CompletedWithWarnings;
            }
            let request = plan
                .request::<P::Node>(self.settings.page_size, self.settings.request_timeout)
                .map_err(SyncError::InvalidRequest)?
                .resume_from(cursor.clone())
                .limit_pages(remaining_pages);

            let pages_before = handler.pages;
            let failure = match paginator.run(&request, &mut handler).await {
                Ok(outcome) => match Self::settle(kind, &target, &handler, &outcome) {
                    Settled::Done(status) => break status,
                    Settled::Failed(classification) => {
                        cursor = outcome.next_cursor;
                        classification
                    }
                },
                Err(PaginationError::Transport {
                    source,
                    cursor: failed_at,
                    ..
                }) => {
                    cursor = failed_at;
                    classify_with_details(Some(&source))
                }
                Err(PaginationError::Cancelled { .. }) => {
                    tracing::warn!(kind = %kind, target = %target, "sweep cancelled");
                    break SyncStatus::AbortedError;
                }
                Err(e @ PaginationError::InvalidRequest(_)) => {
                    return Err(SyncError::InvalidRequest(e));
                }
            };

            if handler.pages > pages_before {
                attempts = 0;
            }

            match failure.category {
                ErrorCategory::AuthError | ErrorCategory::ClientError => {
                    tracing::error!(
                        kind = %kind,
                        target = %target,
                        error = %failure,
                        "fatal sweep failure"
                    );
                    metrics::record_sweep(kind.as_str(), SyncStatus::AbortedError.as_str());
                    return Err(SyncError::Fatal {
                        kind,
                        classification: failure,
                    });
                }
                ErrorCategory::NotFound => {
                    tracing::warn!(
                        kind = %kind,
                        target = %target,
                        error = %failure,
                        "target not found, stopping"
                    );
                    break SyncStatus::AbortedError;
                }
                ErrorCategory::Unknown => {
                    tracing::error!(
                        kind = %kind,
                        target = %target,
                        error = %failure,
                        "unclassified failure, aborting"
                    );
                    break SyncStatus::AbortedError;
                }
                ErrorCategory::Retryable | ErrorCategory::RateLimited => {}
            }

            attempts += 1;
            let rate_limited = failure.category == ErrorCategory::RateLimited;
            if attempts >= self.settings.max_attempts {
                tracing::error!(
                    kind = %kind,
                    target = %target,
                    attempts,
                    error = %failure,
                    "attempt budget exhausted"
                );
                break if rate_limited {
                    SyncStatus::AbortedRateLimit
                } else {
                    SyncStatus::AbortedError
                };
            }

            let wait = self.retry_wait(&plan.scope, &failure, attempts);
            tracing::warn!(
                kind = %kind,
                target = %target,
                category = %failure.category,
                attempt = attempts,
                wait_ms = wait.as_millis() as u64,
                "page failed, retrying"
            );
            emit(
                self.progress.as_ref(),
                SyncProgress::Retrying {
                    kind,
                    target: target.clone(),
                    category: failure.category,
                    attempt: attempts,
                    wait_ms: wait.as_millis() as u64,
                },
            );
            if self.cancel.sleep(wait).await.is_err() {
                tracing::warn!(kind = %kind, target = %target, "sweep cancelled during backoff");
                break SyncStatus::AbortedError;
            }
        };

        let mut result = SyncResult::new(status, handler.count);
        result.pages = handler.pages;
        let SweepHandler { seen, .. } = handler;

        if status == SyncStatus::Completed
            && full_sweep
            && plan.reconcile
            && self.settings.reconcile
        {
            match self.reconcile(processor, &plan.ctx, &seen).await {
                Ok(deleted) => {
                    result.deleted = deleted;
                    emit(
                        self.progress.as_ref(),
                        SyncProgress::Reconciled {
                            kind,
                            target: target.clone(),
                            deleted,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        target = %target,
                        error = %e,
                        "reconciliation failed"
                    );
                    result.status = SyncStatus::CompletedWithWarnings;
                }
            }
        }

        if status == SyncStatus::Completed {
            if let Some(id) = &plan.checkpoint_id {
                if let Err(e) = self.checkpoints.set(id, None).await {
                    tracing::warn!(
                        kind = %kind,
                        checkpoint = %id,
                        error = %e,
                        "could not clear checkpoint"
                    );
                }
            }
        }

        Ok(self.finish(kind, &target, result))
    }

    /// Map a paginator outcome to a final status or a failure to retry.
    fn settle<P: Processor>(
        kind: EntityKind,
        target: &str,
        handler: &SweepHandler<'_, P>,
        outcome: &PaginationOutcome,
    ) -> Settled {
        match outcome.termination_reason {
            TerminationReason::Completed => Settled::Done(SyncStatus::Completed),
            TerminationReason::ProcessorStop if handler.failure.is_some() => {
                if let Some(e) = &handler.failure {
                    tracing::error!(
                        kind = %kind,
                        target = %target,
                        error = %e,
                        "page processing failed"
                    );
                }
                Settled::Done(SyncStatus::AbortedError)
            }
            // Client-side since filter reached older entities.
            TerminationReason::ProcessorStop => Settled::Done(SyncStatus::Completed),
            TerminationReason::MaxPagesReached => {
                tracing::warn!(
                    kind = %kind,
                    target = %target,
                    pages = handler.pages,
                    "page cap reached"
                );
                Settled::Done(SyncStatus::CompletedWithWarnings)
            }
            TerminationReason::NullConnection => {
                tracing::warn!(kind = %kind, target = %target, "connection is null, stopping");
                Settled::Done(SyncStatus::AbortedError)
            }
            // Waits out the tracker's recommended delay in `retry_wait`.
            TerminationReason::RateLimitCritical => Settled::Failed(Classification::new(
                ErrorCategory::RateLimited,
                "rate limit critical",
            )),
            TerminationReason::InvalidResponse => Settled::Failed(
                outcome.classification.clone().unwrap_or_else(|| {
                    Classification::new(ErrorCategory::Unknown, "invalid response")
                }),
            ),
        }
    }

    /// How long to sleep before retrying a failed page.
    fn retry_wait(&self, scope: &Scope, failure: &Classification, attempt: u32) -> Duration {
        let backoff_delay = || {
            let n = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
            backoff::delay(n, &self.settings.backoff)
        };
        if failure.category != ErrorCategory::RateLimited {
            return backoff_delay();
        }

        let until_reset = failure
            .rate_limit_reset_at
            .and_then(|reset| (reset - Utc::now()).to_std().ok())
            .filter(|d| !d.is_zero());
        let tracker_delay = Some(self.tracker.recommended_delay(scope)).filter(|d| !d.is_zero());

        failure
            .suggested_wait
            .or(until_reset)
            .or(tracker_delay)
            .unwrap_or_else(backoff_delay)
            .min(self.settings.rate_limit_wait_cap)
    }

    /// Run the count-only probe. Any failure counts as "not empty".
    async fn probe_is_empty(
        &self,
        kind: EntityKind,
        target: &str,
        plan: &SweepPlan,
        probe: &Probe,
    ) -> bool {
        let retry = RetryConfig::new(self.settings.backoff, self.settings.transport_retries);
        let client = plan.client.as_ref();
        let timeout = self.settings.request_timeout;
        let fetch = with_retry(
            || client.execute(probe.document, &probe.variables, timeout),
            &retry,
            plan.scope.as_str(),
        );

        let error = match self.cancel.run(fetch).await {
            Ok(Ok(response)) => {
                self.tracker
                    .update_from_response(Some(&plan.scope), Some(&response));
                match response.field_as::<i64>(probe.count_path) {
                    Ok(Some(count)) if response.is_valid() => {
                        tracing::debug!(kind = %kind, target = %target, count, "probe result");
                        return count == 0;
                    }
                    Ok(_) => "probe response has no count".to_string(),
                    Err(e) => e.to_string(),
                }
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            kind = %kind,
            target = %target,
            error = %error,
            "probe failed, running full sweep"
        );
        emit(
            self.progress.as_ref(),
            SyncProgress::ProbeFailed {
                kind,
                target: target.to_string(),
                error,
            },
        );
        false
    }

    async fn reconcile<P: Processor>(
        &self,
        processor: &P,
        ctx: &EventContext,
        seen: &HashSet<String>,
    ) -> Result<usize, ProcessError> {
        let txn = self.db.begin().await?;
        let events = processor.reconcile(&txn, ctx, seen).await?;
        txn.commit().await?;
        let deleted = events.len();
        publish_all(self.publisher.as_ref(), events);
        Ok(deleted)
    }

    fn unresolved(&self, kind: EntityKind) -> SyncResult {
        tracing::info!(kind = %kind, "target not resolvable, nothing to sync");
        SyncResult::empty()
    }

    fn resolution_failed(&self, kind: EntityKind, error: DbErr) -> SyncResult {
        tracing::error!(kind = %kind, error = %error, "could not resolve sync target");
        metrics::record_sweep(kind.as_str(), SyncStatus::AbortedError.as_str());
        SyncResult::aborted_error(0)
    }

    fn finish(&self, kind: EntityKind, target: &str, result: SyncResult) -> SyncResult {
        metrics::record_sweep(kind.as_str(), result.status.as_str());
        tracing::info!(
            kind = %kind,
            target = %target,
            status = %result.status,
            count = result.count,
            deleted = result.deleted,
            pages = result.pages,
            "sweep finished"
        );
        emit(
            self.progress.as_ref(),
            SyncProgress::SweepFinished {
                kind,
                target: target.to_string(),
                status: result.status,
                count: result.count,
            },
        );
        result
    }
}

enum Settled {
    Done(SyncStatus),
    Failed(Classification),
}

/// How a sweep applies its `since` bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinceMode {
    /// The connection has no time filter.
    Unsupported,
    /// Passed to the server as the `$since` variable.
    Server,
    /// Newest-first ordering; the handler stops at the first older node.
    Client,
}

/// A count-only query answering "anything newer than since?".
struct Probe {
    document: &'static str,
    variables: Variables,
    count_path: &'static str,
}

/// Everything one sweep needs besides the processor.
struct SweepPlan {
    client: Arc<dyn GraphQlClient>,
    scope: Scope,
    ctx: EventContext,
    document: &'static str,
    connection_path: &'static str,
    variables: Variables,
    since_mode: SinceMode,
    since: Option<DateTime<Utc>>,
    probe: Option<Probe>,
    reconcile: bool,
    checkpoint_id: Option<String>,
    initial_cursor: Option<String>,
}

impl SweepPlan {
    fn request<T>(
        &self,
        page_size: u32,
        timeout: Duration,
    ) -> Result<PaginationRequest<T>, PaginationError>
    where
        T: serde::de::DeserializeOwned + 'static,
    {
        PaginationRequest::builder(self.document)
            .variables(self.variables.clone())
            .variable("first", page_size)
            .timeout(timeout)
            .connection_at(self.connection_path)
            .build()
    }
}

/// Processes each page in its own transaction and checkpoints after it.
struct SweepHandler<'a, P: Processor> {
    db: &'a DatabaseConnection,
    processor: &'a P,
    ctx: &'a EventContext,
    publisher: &'a dyn EventPublisher,
    checkpoints: &'a dyn CheckpointStore,
    checkpoint_id: Option<&'a str>,
    progress: Option<&'a ProgressCallback>,
    client_since: Option<DateTime<Utc>>,
    seen: HashSet<String>,
    count: usize,
    pages: usize,
    reached_since: bool,
    failure: Option<ProcessError>,
}

impl<P: Processor> SweepHandler<'_, P> {
    async fn process_page(&mut self, nodes: &[P::Node]) -> Result<usize, ProcessError> {
        let txn = self.db.begin().await?;
        let mut events = Vec::new();
        for node in nodes {
            let processed = self.processor.process(&txn, node, self.ctx).await?;
            events.extend(processed.events);
            self.seen.insert(P::external_id(node).to_string());
        }
        txn.commit().await?;
        publish_all(self.publisher, events);
        Ok(nodes.len())
    }
}

#[async_trait]
impl<P: Processor> PageHandler<P::Node> for SweepHandler<'_, P> {
    async fn handle_page(&mut self, page: &Connection<P::Node>) -> bool {
        let kind = P::KIND;
        let nodes = match self.client_since {
            Some(since) => {
                let fresh = page
                    .nodes
                    .iter()
                    .take_while(|n| P::updated_at(n).is_none_or(|t| t >= since))
                    .count();
                self.reached_since = fresh < page.nodes.len();
                &page.nodes[..fresh]
            }
            None => &page.nodes[..],
        };

        match self.process_page(nodes).await {
            Ok(n) => self.count += n,
            Err(e) => {
                self.failure = Some(e);
                return false;
            }
        }
        self.pages += 1;
        metrics::record_page(kind.as_str());
        emit(
            self.progress,
            SyncProgress::PageProcessed {
                kind,
                target: self.ctx.parent.clone(),
                page: self.pages,
                count: nodes.len(),
                total_so_far: self.count,
            },
        );

        if self.reached_since {
            tracing::debug!(kind = %kind, "reached entities older than since, stopping");
            return false;
        }

        if let (Some(id), true, Some(end)) =
            (self.checkpoint_id, page.has_next_page(), page.end_cursor())
        {
            if let Err(e) = self.checkpoints.set(id, Some(end)).await {
                tracing::warn!(
                    kind = %kind,
                    checkpoint = %id,
                    error = %e,
                    "could not write checkpoint"
                );
            }
        }
        true
    }
}

fn combine_phases(fields: &SyncResult, items: &SyncResult) -> SyncResult {
    let fields_ok = !fields.status.is_aborted();
    let items_ok = !items.status.is_aborted();
    let rate_limited = fields.status == SyncStatus::AbortedRateLimit
        || items.status == SyncStatus::AbortedRateLimit;
    let status = match (fields_ok, items_ok) {
        _ if rate_limited => SyncStatus::AbortedRateLimit,
        (true, true)
            if fields.status == SyncStatus::Completed && items.status == SyncStatus::Completed =>
        {
            SyncStatus::Completed
        }
        (true, _) | (_, true) => SyncStatus::CompletedWithWarnings,
        (false, false) => SyncStatus::AbortedError,
    };

    let mut phases = BTreeMap::new();
    phases.insert("fields", fields_ok);
    phases.insert("items", items_ok);
    SyncResult {
        status,
        count: fields.count + items.count,
        deleted: fields.deleted + items.deleted,
        pages: fields.pages + items.pages,
        phases,
    }
}

fn repo_variables(owner: &str, name: &str) -> Variables {
    let mut vars = Variables::new();
    vars.insert("owner".into(), Value::from(owner));
    vars.insert("name".into(), Value::from(name));
    vars
}

fn node_variables(id: &str) -> Variables {
    let mut vars = Variables::new();
    vars.insert("id".into(), Value::from(id));
    vars
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
