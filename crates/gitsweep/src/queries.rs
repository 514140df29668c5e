//! GraphQL documents for every sweep and probe.
//!
//! Every document selects `rateLimit` so the tracker sees each response.
//! Page documents take `$first` and `$after`; the cursor is bound by the
//! paginator.

macro_rules! with_rate_limit {
    ($($body:literal),+ $(,)?) => {
        concat!($($body),+, " rateLimit { limit cost remaining resetAt used } }")
    };
}

pub const ISSUES: &str = with_rate_limit!(
    "query($owner: String!, $name: String!, $first: Int!, $after: String, $since: DateTime) {",
    " repository(owner: $owner, name: $name) {",
    " issues(first: $first, after: $after, filterBy: {since: $since},",
    " orderBy: {field: UPDATED_AT, direction: ASC}) {",
    " totalCount pageInfo { hasNextPage endCursor }",
    " nodes { id number title body url state stateReason createdAt updatedAt closedAt",
    " author { login } labels(first: 50) { nodes { name } } issueType { name } } } }",
);

pub const ISSUES_PROBE: &str = with_rate_limit!(
    "query($owner: String!, $name: String!, $since: DateTime) {",
    " repository(owner: $owner, name: $name) {",
    " issues(filterBy: {since: $since}) { totalCount } }",
);

pub const PULL_REQUESTS: &str = with_rate_limit!(
    "query($owner: String!, $name: String!, $first: Int!, $after: String) {",
    " repository(owner: $owner, name: $name) {",
    " pullRequests(first: $first, after: $after, orderBy: {field: UPDATED_AT, direction: DESC}) {",
    " totalCount pageInfo { hasNextPage endCursor }",
    " nodes { id number title body url state isDraft createdAt updatedAt closedAt mergedAt",
    " headRefName baseRefName author { login } labels(first: 50) { nodes { name } } } } }",
);

/// Pull requests have no server-side `since` filter; search counts them.
pub const PULL_REQUESTS_PROBE: &str = with_rate_limit!(
    "query($query: String!) {",
    " search(type: ISSUE, query: $query, first: 1) { issueCount }",
);

pub const ISSUE_COMMENTS: &str = with_rate_limit!(
    "query($id: ID!, $first: Int!, $after: String) {",
    " node(id: $id) { ... on Issue {",
    " comments(first: $first, after: $after) {",
    " totalCount pageInfo { hasNextPage endCursor }",
    " nodes { id body url createdAt updatedAt author { login } } } } }",
);

pub const COMMITS: &str = with_rate_limit!(
    "query($owner: String!, $name: String!, $first: Int!, $after: String, $since: GitTimestamp) {",
    " repository(owner: $owner, name: $name) {",
    " defaultBranchRef { target { ... on Commit {",
    " history(first: $first, after: $after, since: $since) {",
    " totalCount pageInfo { hasNextPage endCursor }",
    " nodes { oid messageHeadline message url committedDate additions deletions",
    " author { name email user { login } } } } } } } }",
);

pub const COMMITS_PROBE: &str = with_rate_limit!(
    "query($owner: String!, $name: String!, $since: GitTimestamp) {",
    " repository(owner: $owner, name: $name) {",
    " defaultBranchRef { target { ... on Commit { history(since: $since) { totalCount } } } } }",
);

pub const PROJECT_FIELDS: &str = with_rate_limit!(
    "query($id: ID!, $first: Int!, $after: String) {",
    " node(id: $id) { ... on ProjectV2 {",
    " fields(first: $first, after: $after) {",
    " totalCount pageInfo { hasNextPage endCursor }",
    " nodes { ... on ProjectV2FieldCommon { id name dataType }",
    " ... on ProjectV2SingleSelectField { options { id name } }",
    " ... on ProjectV2IterationField {",
    " configuration { iterations { id title startDate duration } } } } } } }",
);

pub const PROJECT_ITEMS: &str = with_rate_limit!(
    "query($id: ID!, $first: Int!, $after: String) {",
    " node(id: $id) { ... on ProjectV2 {",
    " items(first: $first, after: $after) {",
    " totalCount pageInfo { hasNextPage endCursor }",
    " nodes { id type isArchived createdAt updatedAt",
    " content { ... on Issue { id title } ... on PullRequest { id title }",
    " ... on DraftIssue { id title } }",
    " fieldValues(first: 50) { nodes {",
    " ... on ProjectV2ItemFieldTextValue { text field { ... on ProjectV2FieldCommon { name } } }",
    " ... on ProjectV2ItemFieldSingleSelectValue {",
    " name field { ... on ProjectV2FieldCommon { name } } }",
    " ... on ProjectV2ItemFieldNumberValue {",
    " number field { ... on ProjectV2FieldCommon { name } } }",
    " ... on ProjectV2ItemFieldDateValue { date field { ... on ProjectV2FieldCommon { name } } }",
    " ... on ProjectV2ItemFieldIterationValue {",
    " title field { ... on ProjectV2FieldCommon { name } } }",
    " } } } } } }",
);
