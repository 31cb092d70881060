//! GraphQL queries used for hierarchy, projects and collaborator access.

use serde::Deserialize;
use serde_json::{json, Value};
use trellis_core::{ApiError, IssueRef, ProjectInfo};

pub(crate) const PARENT_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!) {
  repository(owner: $owner, name: $repo) {
    issue(number: $number) {
      parent {
        number
        repository { owner { login } name }
      }
    }
  }
}"#;

const PROJECT_ITEMS_FIELDS: &str = r#"
      projectItems(first: 10) {
        nodes {
          project { title }
          fieldValueByName(name: "Status") {
            ... on ProjectV2ItemFieldSingleSelectValue { name }
          }
        }
      }"#;

pub(crate) fn project_query(is_pr: bool) -> String {
    let item = if is_pr { "pullRequest" } else { "issue" };
    format!(
        "query($owner: String!, $repo: String!, $number: Int!) {{\n  repository(owner: $owner, name: $repo) {{\n    {}(number: $number) {{{}\n    }}\n  }}\n}}",
        item, PROJECT_ITEMS_FIELDS
    )
}

pub(crate) const ACCESS_QUERY: &str = r#"
query($owner: String!, $name: String!, $username: String!) {
  repository(owner: $owner, name: $name) {
    isPrivate
    collaborators(query: $username, first: 1) {
      edges { permission node { login } }
    }
  }
}"#;

pub(crate) fn item_variables(owner: &str, repo: &str, number: u64) -> Value {
    json!({ "owner": owner, "repo": repo, "number": number })
}

pub(crate) fn access_variables(owner: &str, repo: &str, username: &str) -> Value {
    json!({ "owner": owner, "name": repo, "username": username })
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

/// Standard `{ data, errors }` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl<T> GraphQlResponse<T> {
    pub(crate) fn into_data(self) -> Result<T, ApiError> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(ApiError::Decode(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| ApiError::Decode("GraphQL response without data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryName {
    owner: Login,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ParentIssue {
    number: u64,
    repository: RepositoryName,
}

#[derive(Debug, Deserialize)]
struct IssueWithParent {
    parent: Option<ParentIssue>,
}

#[derive(Debug, Deserialize)]
struct ParentRepository {
    issue: Option<IssueWithParent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParentData {
    repository: Option<ParentRepository>,
}

impl ParentData {
    pub(crate) fn into_parent(self) -> Option<IssueRef> {
        let parent = self.repository?.issue?.parent?;
        Some(IssueRef::new(
            &parent.repository.owner.login,
            &parent.repository.name,
            parent.number,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ProjectTitle {
    title: String,
}

#[derive(Debug, Deserialize)]
struct StatusValue {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectItem {
    project: Option<ProjectTitle>,
    field_value_by_name: Option<StatusValue>,
}

#[derive(Debug, Deserialize)]
struct ProjectItems {
    #[serde(default)]
    nodes: Vec<Option<ProjectItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemWithProjects {
    project_items: Option<ProjectItems>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRepository {
    issue: Option<ItemWithProjects>,
    pull_request: Option<ItemWithProjects>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectData {
    repository: Option<ProjectRepository>,
}

impl ProjectData {
    /// Projects with a title, in API order.
    pub(crate) fn into_projects(self) -> Vec<ProjectInfo> {
        let Some(repository) = self.repository else {
            return Vec::new();
        };
        let item = repository.issue.or(repository.pull_request);
        item.and_then(|item| item.project_items)
            .map(|items| items.nodes)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|node| {
                let title = node.project?.title;
                if title.is_empty() {
                    return None;
                }
                let status = node
                    .field_value_by_name
                    .and_then(|value| value.name)
                    .unwrap_or_default();
                Some(ProjectInfo {
                    project_title: title,
                    status,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CollaboratorEdge {
    permission: String,
    node: Login,
}

#[derive(Debug, Deserialize)]
struct Collaborators {
    #[serde(default)]
    edges: Vec<CollaboratorEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessRepository {
    is_private: bool,
    collaborators: Option<Collaborators>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccessData {
    repository: Option<AccessRepository>,
}

/// Repository visibility and whether a user can push to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RepoAccess {
    pub is_private: bool,
    pub has_push: bool,
}

impl AccessData {
    pub(crate) fn into_access(self, username: &str) -> RepoAccess {
        let Some(repository) = self.repository else {
            return RepoAccess {
                is_private: false,
                has_push: false,
            };
        };
        let has_push = repository
            .collaborators
            .map(|c| c.edges)
            .unwrap_or_default()
            .into_iter()
            .find(|edge| edge.node.login.eq_ignore_ascii_case(username))
            .map(|edge| matches!(edge.permission.as_str(), "WRITE" | "MAINTAIN" | "ADMIN"))
            .unwrap_or(false);
        RepoAccess {
            is_private: repository.is_private,
            has_push,
        }
    }
}
