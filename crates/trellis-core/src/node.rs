//! Node types for the issue graph.
//!
//! A node is one visited issue or pull request. Nodes are keyed by a
//! case-insensitive `owner/repo#number` key so that references written
//! with different casing collapse onto the same node.

use crate::error::TargetParseError;
use crate::references::IssueReference;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies an issue or pull request in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueRef {
    /// Creates a new reference.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }

    /// Returns the lower-cased node key for this reference.
    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.owner, &self.repo, self.number)
    }

    /// Returns the lower-cased `owner/repo` key.
    pub fn repo_key(&self) -> String {
        repo_key(&self.owner, &self.repo)
    }

    /// True when both references point at the same repository.
    pub fn same_repo(&self, owner: &str, repo: &str) -> bool {
        self.owner.eq_ignore_ascii_case(owner) && self.repo.eq_ignore_ascii_case(repo)
    }

    /// Formats the reference relative to a focus repository.
    ///
    /// Items in the focus repository render as `#N`, everything else as
    /// `owner/repo#N`.
    pub fn display_relative(&self, focus_owner: &str, focus_repo: &str) -> String {
        if self.same_repo(focus_owner, focus_repo) {
            format!("#{}", self.number)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl From<&IssueReference> for IssueRef {
    fn from(reference: &IssueReference) -> Self {
        IssueRef::new(&reference.owner, &reference.repo, reference.number)
    }
}

impl FromStr for IssueRef {
    type Err = TargetParseError;

    /// Parses `owner/repo#123` or a full GitHub issue/pull URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(TargetParseError::Empty);
        }

        if input.starts_with("http://") || input.starts_with("https://") {
            let without_scheme = input.split_once("://").map(|(_, rest)| rest).unwrap_or(input);
            let parts: Vec<&str> = without_scheme
                .trim_end_matches('/')
                .split('/')
                .collect();
            // host / owner / repo / (issues|pull) / number
            if parts.len() >= 5 && matches!(parts[3], "issues" | "pull") {
                let number = parse_number(parts[4], input)?;
                return Ok(IssueRef::new(parts[1], parts[2], number));
            }
            return Err(TargetParseError::Malformed(input.to_string()));
        }

        let (path, number) = input
            .split_once('#')
            .ok_or_else(|| TargetParseError::Malformed(input.to_string()))?;
        let (owner, repo) = path
            .split_once('/')
            .ok_or_else(|| TargetParseError::Malformed(input.to_string()))?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(TargetParseError::Malformed(input.to_string()));
        }
        let number = parse_number(number, input)?;
        Ok(IssueRef::new(owner, repo, number))
    }
}

fn parse_number(raw: &str, input: &str) -> Result<u64, TargetParseError> {
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(TargetParseError::InvalidNumber(input.to_string())),
    }
}

/// Case-insensitive key for a node: `owner/repo#number`, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn new(owner: &str, repo: &str, number: u64) -> Self {
        Self(format!(
            "{}/{}#{}",
            owner.to_lowercase(),
            repo.to_lowercase(),
            number
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-cased `owner/repo` key.
pub fn repo_key(owner: &str, repo: &str) -> String {
    format!("{}/{}", owner.to_lowercase(), repo.to_lowercase())
}

/// The role a work item plays in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Large initiative, identified by issue type, label or title.
    Epic,

    /// Issue with at least one sub-issue.
    Batch,

    /// Regular issue.
    Task,

    /// Pull request.
    Pr,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Epic => "epic",
            NodeType::Batch => "batch",
            NodeType::Task => "task",
            NodeType::Pr => "pr",
        }
    }

    /// Epics and batches carry status and tasklist data.
    pub fn is_tracking(&self) -> bool {
        matches!(self, NodeType::Epic | NodeType::Batch)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determines the type of a node from its properties.
///
/// Order matters: a pull request is always `Pr`; an issue mentioning "epic"
/// in its type, labels or title is an `Epic` even when it has sub-issues.
pub fn classify_node(
    is_pr: bool,
    labels: &[String],
    title: &str,
    issue_type: Option<&str>,
    has_sub_issues: bool,
) -> NodeType {
    if is_pr {
        return NodeType::Pr;
    }

    let mentions_epic = |s: &str| s.to_lowercase().contains("epic");

    if issue_type.map(mentions_epic).unwrap_or(false)
        || labels.iter().any(|label| mentions_epic(label))
        || mentions_epic(title)
    {
        return NodeType::Epic;
    }

    if has_sub_issues {
        NodeType::Batch
    } else {
        NodeType::Task
    }
}

/// A single item from a legacy markdown tasklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasklistItem {
    /// Item text with the checkbox removed.
    pub text: String,
    pub completed: bool,
    /// First issue/PR reference found in the text, if any.
    pub linked_ref: Option<IssueReference>,
}

/// A visited issue or pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    #[serde(flatten)]
    pub reference: IssueRef,
    pub node_type: NodeType,
    /// "open", "closed", or "merged" for pull requests.
    pub state: String,
    /// "completed", "not_planned", ... for issues; "merged" for merged PRs.
    pub state_reason: String,
    /// Status fragments extracted for epics and batches.
    pub status_update: String,
    pub title: String,
    pub body_preview: String,
    pub tasklist_items: Vec<TasklistItem>,
    /// Distance from the focus at first visit.
    pub depth: usize,
    pub is_focus: bool,
}

impl GraphNode {
    pub fn key(&self) -> NodeKey {
        self.reference.key()
    }

    /// State with its reason appended when the reason adds information,
    /// e.g. `closed (completed)`.
    pub fn state_label(&self) -> String {
        if !self.state_reason.is_empty() && self.state_reason != self.state {
            format!("{} ({})", self.state, self.state_reason)
        } else {
            self.state.clone()
        }
    }
}

/// Project membership of the focus node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub project_title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
}
