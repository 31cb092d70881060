//! In-memory GitHub double for crawl tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trellis_core::{
    AccessFilter, ApiError, Comment, CrawlConfig, HierarchySource, Issue, IssueRef, IssueSource,
    ListOptions, NodeKey, Page, ProjectInfo, PullRequestLinks, SourceIssue, SubIssue,
    TimelineEvent,
};
use trellis_graph::Sources;

pub const OWNER: &str = "octo";
pub const REPO: &str = "app";

pub fn r(number: u64) -> IssueRef {
    IssueRef::new(OWNER, REPO, number)
}

pub fn issue(number: u64, title: &str, body: &str) -> Issue {
    Issue {
        number,
        title: title.to_string(),
        body: body.to_string(),
        state: "open".to_string(),
        author: "alice".to_string(),
        ..Default::default()
    }
}

pub fn pull_request(number: u64, title: &str, body: &str) -> Issue {
    Issue {
        pull_request: Some(PullRequestLinks::default()),
        ..issue(number, title, body)
    }
}

/// Fast settings for tests: tiny backoff, generous deadline.
pub fn test_config() -> CrawlConfig {
    CrawlConfig {
        rate_limit_backoff_ms: 1,
        crawl_timeout_ms: 5_000,
        ..CrawlConfig::default()
    }
}

pub fn rate_limited() -> ApiError {
    ApiError::status(429, Some(0), "API rate limit exceeded")
}

#[derive(Default)]
pub struct MockGitHub {
    issues: HashMap<NodeKey, Issue>,
    sub_issues: HashMap<NodeKey, Vec<SubIssue>>,
    comments: HashMap<NodeKey, Vec<Comment>>,
    timelines: HashMap<NodeKey, Vec<TimelineEvent>>,
    parents: HashMap<NodeKey, IssueRef>,
    projects: HashMap<NodeKey, Vec<ProjectInfo>>,
    failures: Mutex<HashMap<NodeKey, VecDeque<ApiError>>>,
    repo_status: HashMap<String, u16>,
    hanging: HashSet<NodeKey>,
    unsafe_authors: HashSet<String>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: Mutex<HashMap<NodeKey, usize>>,
}

impl MockGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(mut self, target: IssueRef, issue: Issue) -> Self {
        self.issues.insert(target.key(), issue);
        self
    }

    /// Adds an issue in the default repository.
    pub fn with(self, issue: Issue) -> Self {
        let target = r(issue.number);
        self.with_issue(target, issue)
    }

    pub fn with_sub_issues(mut self, parent: IssueRef, children: &[IssueRef]) -> Self {
        let subs = children
            .iter()
            .map(|child| SubIssue {
                number: child.number,
                owner: Some(child.owner.clone()),
                repo: Some(child.repo.clone()),
            })
            .collect();
        self.sub_issues.insert(parent.key(), subs);
        self
    }

    /// Comments, newest first.
    pub fn with_comments(mut self, target: IssueRef, bodies: &[&str]) -> Self {
        let comments = bodies
            .iter()
            .map(|body| Comment {
                body: body.to_string(),
            })
            .collect();
        self.comments.insert(target.key(), comments);
        self
    }

    pub fn with_cross_reference(mut self, target: IssueRef, referrer: IssueRef) -> Self {
        self.timelines
            .entry(target.key())
            .or_default()
            .push(TimelineEvent {
                event: "cross-referenced".to_string(),
                source: Some(SourceIssue {
                    number: referrer.number,
                    repository_url: Some(format!(
                        "https://api.github.com/repos/{}/{}",
                        referrer.owner, referrer.repo
                    )),
                }),
            });
        self
    }

    pub fn with_timeline_event(mut self, target: IssueRef, event: &str) -> Self {
        self.timelines
            .entry(target.key())
            .or_default()
            .push(TimelineEvent {
                event: event.to_string(),
                source: None,
            });
        self
    }

    pub fn with_parent(mut self, child: IssueRef, parent: IssueRef) -> Self {
        self.parents.insert(child.key(), parent);
        self
    }

    pub fn with_projects(mut self, target: IssueRef, projects: Vec<ProjectInfo>) -> Self {
        self.projects.insert(target.key(), projects);
        self
    }

    /// Errors returned by `get_issue` before it succeeds.
    pub fn with_failures(self, target: IssueRef, errors: Vec<ApiError>) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(target.key(), errors.into());
        }
        self
    }

    /// Every `get_issue` in the repository answers with `status`.
    pub fn with_repo_status(mut self, owner: &str, repo: &str, status: u16) -> Self {
        self.repo_status
            .insert(trellis_core::repo_key(owner, repo), status);
        self
    }

    /// `get_issue` for `target` never completes.
    pub fn with_hanging(mut self, target: IssueRef) -> Self {
        self.hanging.insert(target.key());
        self
    }

    pub fn with_unsafe_author(mut self, login: &str) -> Self {
        self.unsafe_authors.insert(login.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self, target: &IssueRef) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&target.key()).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn all_calls(&self) -> HashMap<NodeKey, usize> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn paginate<T: Clone>(items: Option<&Vec<T>>, opts: ListOptions) -> Page<T> {
        let items = items.cloned().unwrap_or_default();
        let per_page = opts.per_page.max(1) as usize;
        let start = (opts.page.max(1) as usize - 1) * per_page;
        let page: Vec<T> = items.iter().skip(start).take(per_page).cloned().collect();
        let next_page = (start + per_page < items.len()).then(|| opts.page + 1);
        Page {
            items: page,
            next_page,
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IssueSource for MockGitHub {
    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, ApiError> {
        let target = IssueRef::new(owner, repo, number);
        let key = target.key();
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(key.clone()).or_insert(0) += 1;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if self.hanging.contains(&key) {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(&key).and_then(VecDeque::pop_front));
        if let Some(err) = scripted {
            return Err(err);
        }
        if let Some(status) = self.repo_status.get(&target.repo_key()) {
            return Err(ApiError::status(*status, Some(4000), "Not Found"));
        }

        self.issues
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::status(404, Some(4000), "Not Found"))
    }

    async fn list_sub_issues(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<SubIssue>, ApiError> {
        let key = IssueRef::new(owner, repo, number).key();
        Ok(Self::paginate(self.sub_issues.get(&key), opts))
    }

    async fn list_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<Comment>, ApiError> {
        let key = IssueRef::new(owner, repo, number).key();
        Ok(Self::paginate(self.comments.get(&key), opts))
    }

    async fn list_timeline(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<TimelineEvent>, ApiError> {
        let key = IssueRef::new(owner, repo, number).key();
        Ok(Self::paginate(self.timelines.get(&key), opts))
    }
}

#[async_trait]
impl HierarchySource for MockGitHub {
    async fn parent_of(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<IssueRef>, ApiError> {
        let key = IssueRef::new(owner, repo, number).key();
        Ok(self.parents.get(&key).cloned())
    }

    async fn project_items(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        _is_pr: bool,
    ) -> Result<Vec<ProjectInfo>, ApiError> {
        let key = IssueRef::new(owner, repo, number).key();
        Ok(self.projects.get(&key).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AccessFilter for MockGitHub {
    async fn is_safe_content(
        &self,
        author: &str,
        _owner: &str,
        _repo: &str,
    ) -> Result<bool, ApiError> {
        Ok(!self.unsafe_authors.contains(author))
    }
}

/// Wires one mock into every collaborator slot.
pub fn sources(mock: &Arc<MockGitHub>) -> Sources {
    Sources::new(mock.clone())
        .with_hierarchy(mock.clone())
        .with_access_filter(mock.clone())
}
