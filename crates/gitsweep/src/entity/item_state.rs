//! Lifecycle states shared by issues and pull requests.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Issue state as reported by GitHub.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueState {
    #[sea_orm(string_value = "open")]
    #[default]
    Open,
    #[sea_orm(string_value = "closed")]
    Closed,
}

/// Pull request state as reported by GitHub.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestState {
    #[sea_orm(string_value = "open")]
    #[default]
    Open,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "merged")]
    Merged,
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueState::Open => write!(f, "open"),
            IssueState::Closed => write!(f, "closed"),
        }
    }
}

impl std::fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullRequestState::Open => write!(f, "open"),
            PullRequestState::Closed => write!(f, "closed"),
            PullRequestState::Merged => write!(f, "merged"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_github_casing() {
        let state: PullRequestState = serde_json::from_str("\"MERGED\"").unwrap();
        assert_eq!(state, PullRequestState::Merged);
        let state: IssueState = serde_json::from_str("\"CLOSED\"").unwrap();
        assert_eq!(state, IssueState::Closed);
    }

    #[test]
    fn display_outputs_stored_strings() {
        assert_eq!(IssueState::Open.to_string(), "open");
        assert_eq!(PullRequestState::Merged.to_string(), "merged");
    }
}
