//! Collaborator interfaces consumed by the crawler.
//!
//! The crawler never talks to the network directly. It is handed an
//! [`IssueSource`] for REST-style lookups, an optional [`HierarchySource`]
//! for the lightweight parent and project queries, and an optional
//! [`AccessFilter`] consulted in lockdown mode.

use crate::error::ApiError;
use crate::node::{IssueRef, ProjectInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical metadata of an issue or pull request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    /// "open" or "closed".
    pub state: String,
    pub state_reason: Option<String>,
    /// Login of the author, empty when unknown.
    pub author: String,
    pub labels: Vec<String>,
    /// Name of the issue type (e.g. "Epic"), if the repository uses types.
    pub issue_type: Option<String>,
    /// Present when the item is a pull request.
    pub pull_request: Option<PullRequestLinks>,
    pub milestone: Option<Milestone>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    /// True for pull requests with a merge timestamp.
    pub fn is_merged(&self) -> bool {
        self.pull_request
            .as_ref()
            .map(|pr| pr.merged_at.is_some())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequestLinks {
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    pub due_on: Option<DateTime<Utc>>,
}

/// A sub-issue as returned by the listing; the repository is only present
/// when it differs from the parent's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubIssue {
    pub number: u64,
    pub owner: Option<String>,
    pub repo: Option<String>,
}

impl SubIssue {
    /// Resolves the sub-issue against the parent's repository.
    pub fn resolve(&self, parent_owner: &str, parent_repo: &str) -> IssueRef {
        IssueRef::new(
            self.owner.as_deref().unwrap_or(parent_owner),
            self.repo.as_deref().unwrap_or(parent_repo),
            self.number,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Event name, e.g. "cross-referenced" or "labeled".
    pub event: String,
    pub source: Option<SourceIssue>,
}

/// The issue on the other side of a cross-reference event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIssue {
    pub number: u64,
    /// API URL of the source repository, `.../repos/{owner}/{repo}`.
    pub repository_url: Option<String>,
}

impl SourceIssue {
    /// Resolves the source issue, taking owner and repo from the last two
    /// segments of `repository_url` and falling back to the given repository.
    pub fn resolve(&self, default_owner: &str, default_repo: &str) -> IssueRef {
        let from_url = self.repository_url.as_deref().and_then(|url| {
            let mut segments = url.trim_end_matches('/').rsplit('/');
            let repo = segments.next()?;
            let owner = segments.next()?;
            Some((owner, repo))
        });
        match from_url {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
                IssueRef::new(owner, repo, self.number)
            }
            _ => IssueRef::new(default_owner, default_repo, self.number),
        }
    }
}

/// Pagination options for list calls. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub per_page: u32,
    pub page: u32,
}

impl ListOptions {
    pub fn per_page(per_page: u32) -> Self {
        Self { per_page, page: 1 }
    }

    pub fn next(self, page: u32) -> Self {
        Self { page, ..self }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    pub fn single(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// REST-style access to issues and their listings.
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, ApiError>;

    async fn list_sub_issues(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<SubIssue>, ApiError>;

    /// Lists comments newest first.
    async fn list_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<Comment>, ApiError>;

    async fn list_timeline(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<TimelineEvent>, ApiError>;
}

/// Lightweight hierarchy and project queries.
#[async_trait]
pub trait HierarchySource: Send + Sync {
    /// Returns the parent issue, if any.
    async fn parent_of(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<IssueRef>, ApiError>;

    /// Returns project membership, using the pull request query when `is_pr`.
    async fn project_items(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        is_pr: bool,
    ) -> Result<Vec<ProjectInfo>, ApiError>;
}

/// Content safety check used in lockdown mode.
#[async_trait]
pub trait AccessFilter: Send + Sync {
    async fn is_safe_content(&self, author: &str, owner: &str, repo: &str)
        -> Result<bool, ApiError>;
}
