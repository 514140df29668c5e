use gitsweep::Scope;
use gitsweep::entity::{tracked_project, tracked_repository};
use gitsweep::sync::target;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};

use crate::TargetAction;

pub(crate) async fn handle_target(
    action: TargetAction,
    db: &DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TargetAction::AddRepo { scope, full_name } => {
            let repo = target::track_repository(db, &Scope::new(scope), &full_name).await?;
            println!("Tracking {} as {}", repo.full_name(), repo.id);
        }
        TargetAction::AddProject {
            scope,
            node_id,
            title,
        } => {
            let project = target::track_project(db, &Scope::new(scope), &node_id, title).await?;
            println!("Tracking project {} as {}", project.node_id, project.id);
        }
        TargetAction::List => {
            let repos = tracked_repository::Entity::find()
                .order_by_asc(tracked_repository::Column::Scope)
                .order_by_asc(tracked_repository::Column::Owner)
                .order_by_asc(tracked_repository::Column::Name)
                .all(db)
                .await?;
            let projects = tracked_project::Entity::find()
                .order_by_asc(tracked_project::Column::Scope)
                .order_by_asc(tracked_project::Column::NodeId)
                .all(db)
                .await?;

            let rows: Vec<TargetRow> = repos
                .iter()
                .map(TargetRow::from_repository)
                .chain(projects.iter().map(TargetRow::from_project))
                .collect();

            if rows.is_empty() {
                println!("No tracked targets.");
                println!("Add one with: gitsweep target add-repo <scope> <owner/name>");
                return Ok(());
            }

            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);
        }
    }

    Ok(())
}

/// One tracked target for display.
#[derive(Debug, Clone, tabled::Tabled)]
struct TargetRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Last Synced")]
    last_synced: String,
}

impl TargetRow {
    fn from_repository(repo: &tracked_repository::Model) -> Self {
        Self {
            id: repo.id.to_string(),
            kind: "repository",
            scope: repo.scope.clone(),
            target: repo.full_name(),
            last_synced: format_last_synced(repo.last_synced_at),
        }
    }

    fn from_project(project: &tracked_project::Model) -> Self {
        let target = match &project.title {
            Some(title) => format!("{} ({})", title, project.node_id),
            None => project.node_id.clone(),
        };
        Self {
            id: project.id.to_string(),
            kind: "project",
            scope: project.scope.clone(),
            target,
            last_synced: format_last_synced(project.last_synced_at),
        }
    }
}

fn format_last_synced(at: Option<sea_orm::prelude::DateTimeWithTimeZone>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S %:z").to_string())
        .unwrap_or_else(|| "never".to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn repository_row_shows_full_name_and_never_synced() {
        let repo = tracked_repository::Model {
            id: Uuid::nil(),
            scope: "acme".to_string(),
            owner: "octo".to_string(),
            name: "hello".to_string(),
            created_at: Utc::now().fixed_offset(),
            last_synced_at: None,
        };
        let row = TargetRow::from_repository(&repo);
        assert_eq!(row.kind, "repository");
        assert_eq!(row.target, "octo/hello");
        assert_eq!(row.last_synced, "never");
    }

    #[test]
    fn project_row_includes_title_when_present() {
        let synced = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let project = tracked_project::Model {
            id: Uuid::nil(),
            scope: "acme".to_string(),
            node_id: "PVT_kwDOABCD".to_string(),
            title: Some("Roadmap".to_string()),
            created_at: Utc::now().fixed_offset(),
            last_synced_at: Some(synced.fixed_offset()),
        };
        let row = TargetRow::from_project(&project);
        assert_eq!(row.target, "Roadmap (PVT_kwDOABCD)");
        assert_eq!(row.last_synced, "2026-03-01 12:00:00 +00:00");
    }
}
