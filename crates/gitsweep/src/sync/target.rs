//! Resolving and registering sync targets.
//!
//! A target that is missing, belongs to another scope, or carries a
//! malformed name resolves to `None`; the sweep then reports nothing to do.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::{issue, tracked_project, tracked_repository};
use crate::scope::Scope;

const MAX_OWNER_LEN: usize = 39;
const MAX_REPO_NAME_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid repository name `{0}`, expected owner/name")]
    InvalidRepository(String),

    #[error("invalid node id `{0}`")]
    InvalidNodeId(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// GitHub login rules: alphanumerics and hyphens, no leading hyphen.
pub fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && owner.len() <= MAX_OWNER_LEN
        && !owner.starts_with('-')
        && owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_REPO_NAME_LEN
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Split and validate `owner/name`.
pub fn parse_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (owner, name) = full_name.split_once('/')?;
    (is_valid_owner(owner) && is_valid_repo_name(name)).then_some((owner, name))
}

pub fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(char::is_whitespace)
}

pub async fn resolve_repository(
    db: &DatabaseConnection,
    scope: &Scope,
    id: Uuid,
) -> Result<Option<tracked_repository::Model>, DbErr> {
    let repo = tracked_repository::Entity::find_by_id(id).one(db).await?;
    Ok(repo.filter(|r| {
        let ok = r.scope == scope.as_str()
            && is_valid_owner(&r.owner)
            && is_valid_repo_name(&r.name);
        if !ok {
            tracing::warn!(
                scope = %scope,
                repository = %r.full_name(),
                "repository target rejected"
            );
        }
        ok
    }))
}

pub async fn resolve_project(
    db: &DatabaseConnection,
    scope: &Scope,
    id: Uuid,
) -> Result<Option<tracked_project::Model>, DbErr> {
    let project = tracked_project::Entity::find_by_id(id).one(db).await?;
    Ok(project.filter(|p| p.scope == scope.as_str() && is_valid_node_id(&p.node_id)))
}

/// A stored issue and the repository it belongs to.
pub async fn resolve_issue(
    db: &DatabaseConnection,
    scope: &Scope,
    node_id: &str,
) -> Result<Option<(issue::Model, tracked_repository::Model)>, DbErr> {
    if !is_valid_node_id(node_id) {
        return Ok(None);
    }
    let Some(issue) = issue::Entity::find_by_node_id(node_id).one(db).await? else {
        return Ok(None);
    };
    let repo = resolve_repository(db, scope, issue.repository_id).await?;
    Ok(repo.map(|repo| (issue, repo)))
}

/// Register a repository, or return the existing registration.
pub async fn track_repository(
    db: &DatabaseConnection,
    scope: &Scope,
    full_name: &str,
) -> Result<tracked_repository::Model, TargetError> {
    let (owner, name) = parse_full_name(full_name)
        .ok_or_else(|| TargetError::InvalidRepository(full_name.to_string()))?;

    if let Some(existing) = tracked_repository::Entity::find_by_name(scope.as_str(), owner, name)
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    let model = tracked_repository::ActiveModel {
        id: Set(Uuid::new_v4()),
        scope: Set(scope.to_string()),
        owner: Set(owner.to_string()),
        name: Set(name.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
        last_synced_at: Set(None),
    };
    Ok(model.insert(db).await?)
}

/// Register a project by node id, or return the existing registration.
pub async fn track_project(
    db: &DatabaseConnection,
    scope: &Scope,
    node_id: &str,
    title: Option<String>,
) -> Result<tracked_project::Model, TargetError> {
    if !is_valid_node_id(node_id) {
        return Err(TargetError::InvalidNodeId(node_id.to_string()));
    }

    if let Some(existing) = tracked_project::Entity::find_by_node_id(node_id)
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    let model = tracked_project::ActiveModel {
        id: Set(Uuid::new_v4()),
        scope: Set(scope.to_string()),
        node_id: Set(node_id.to_string()),
        title: Set(title),
        created_at: Set(Utc::now().fixed_offset()),
        last_synced_at: Set(None),
    };
    Ok(model.insert(db).await?)
}

/// Record a completed sweep on a repository target.
pub async fn mark_repository_synced(db: &DatabaseConnection, id: Uuid) -> Result<(), DbErr> {
    let model = tracked_repository::ActiveModel {
        id: Set(id),
        last_synced_at: Set(Some(Utc::now().fixed_offset())),
        ..Default::default()
    };
    model.update(db).await?;
    Ok(())
}

/// Record a completed sweep on a project target.
pub async fn mark_project_synced(db: &DatabaseConnection, id: Uuid) -> Result<(), DbErr> {
    let model = tracked_project::ActiveModel {
        id: Set(id),
        last_synced_at: Set(Some(Utc::now().fixed_offset())),
        ..Default::default()
    };
    model.update(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_rules() {
        assert!(is_valid_owner("rust-lang"));
        assert!(is_valid_owner("a"));
        assert!(!is_valid_owner(""));
        assert!(!is_valid_owner("-leading"));
        assert!(!is_valid_owner("has_underscore"));
        assert!(!is_valid_owner(&"a".repeat(40)));
    }

    #[test]
    fn repo_name_rules() {
        assert!(is_valid_repo_name("repo.rs"));
        assert!(is_valid_repo_name("my_repo-2"));
        assert!(!is_valid_repo_name("."));
        assert!(!is_valid_repo_name(".."));
        assert!(!is_valid_repo_name("white space"));
        assert!(!is_valid_repo_name(&"x".repeat(101)));
    }

    #[test]
    fn parse_full_name_requires_both_parts() {
        assert_eq!(parse_full_name("octo/cat"), Some(("octo", "cat")));
        assert_eq!(parse_full_name("octocat"), None);
        assert_eq!(parse_full_name("octo/"), None);
        assert_eq!(parse_full_name("octo/a/b"), None);
    }

    #[test]
    fn node_id_rules() {
        assert!(is_valid_node_id("PVT_kwDOA"));
        assert!(!is_valid_node_id(""));
        assert!(!is_valid_node_id("PVT kw"));
    }

    #[cfg(feature = "migrate")]
    #[tokio::test]
    async fn track_repository_is_idempotent_and_resolves() {
        let db = crate::db::connect_and_migrate("sqlite::memory:").await.unwrap();
        let scope = Scope::from("acme");

        let first = track_repository(&db, &scope, "acme/widgets").await.unwrap();
        let second = track_repository(&db, &scope, "acme/widgets").await.unwrap();
        assert_eq!(first.id, second.id);

        let resolved = resolve_repository(&db, &scope, first.id).await.unwrap();
        assert!(resolved.is_some());

        let other_scope = resolve_repository(&db, &Scope::from("other"), first.id)
            .await
            .unwrap();
        assert!(other_scope.is_none());

        assert!(matches!(
            track_repository(&db, &scope, "not-a-repo").await,
            Err(TargetError::InvalidRepository(_))
        ));
    }
}
