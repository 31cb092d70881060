//! REST payloads and their conversion into the crawler's model.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use trellis_core::{
    Comment, Issue, Milestone, PullRequestLinks, SourceIssue, SubIssue, TimelineEvent,
};

#[derive(Debug, Deserialize)]
pub(crate) struct RawUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLabel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawIssueType {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPullRequest {
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMilestone {
    pub title: String,
    pub due_on: Option<DateTime<Utc>>,
}

/// An issue or pull request as returned by `/repos/{o}/{r}/issues/{n}`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawIssue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    pub state_reason: Option<String>,
    pub user: Option<RawUser>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    #[serde(rename = "type")]
    pub issue_type: Option<RawIssueType>,
    pub pull_request: Option<RawPullRequest>,
    pub milestone: Option<RawMilestone>,
    pub repository_url: Option<String>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        Issue {
            number: raw.number,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            state: raw.state,
            state_reason: raw.state_reason.filter(|reason| !reason.is_empty()),
            author: raw.user.map(|user| user.login).unwrap_or_default(),
            labels: raw.labels.into_iter().map(|label| label.name).collect(),
            issue_type: raw.issue_type.map(|t| t.name),
            pull_request: raw.pull_request.map(|pr| PullRequestLinks {
                merged_at: pr.merged_at,
            }),
            milestone: raw.milestone.map(|m| Milestone {
                title: m.title,
                due_on: m.due_on,
            }),
        }
    }
}

impl From<RawIssue> for SubIssue {
    fn from(raw: RawIssue) -> Self {
        let (owner, repo) = match raw.repository_url.as_deref().and_then(owner_repo_from_url) {
            Some((owner, repo)) => (Some(owner), Some(repo)),
            None => (None, None),
        };
        SubIssue {
            number: raw.number,
            owner,
            repo,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawComment {
    pub body: Option<String>,
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Comment {
            body: raw.body.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSourceIssue {
    pub number: u64,
    pub repository_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEventSource {
    pub issue: Option<RawSourceIssue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTimelineEvent {
    pub event: Option<String>,
    pub source: Option<RawEventSource>,
}

impl From<RawTimelineEvent> for TimelineEvent {
    fn from(raw: RawTimelineEvent) -> Self {
        TimelineEvent {
            event: raw.event.unwrap_or_default(),
            source: raw
                .source
                .and_then(|source| source.issue)
                .map(|issue| SourceIssue {
                    number: issue.number,
                    repository_url: issue.repository_url,
                }),
        }
    }
}

/// `(owner, repo)` from `https://api.github.com/repos/{owner}/{repo}`.
pub(crate) fn owner_repo_from_url(url: &str) -> Option<(String, String)> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let repo = segments.next().filter(|s| !s.is_empty())?;
    let owner = segments.next().filter(|s| !s.is_empty())?;
    Some((owner.to_string(), repo.to_string()))
}

/// Page number of the `rel="next"` entry in a `Link` header.
pub(crate) fn next_page_from_link(header: &str) -> Option<u32> {
    header.split(',').find_map(|part| {
        let (url, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let url = url.trim().trim_start_matches('<').trim_end_matches('>');
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}
