//! `reqwest` client for the GitHub REST and GraphQL APIs.

use crate::graphql::{
    access_variables, item_variables, project_query, AccessData, GraphQlResponse, ParentData,
    ProjectData, RepoAccess, ACCESS_QUERY, PARENT_QUERY,
};
use crate::rest::{next_page_from_link, RawComment, RawIssue, RawTimelineEvent};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use trellis_core::{
    repo_key, AccessFilter, ApiError, Comment, GitHubConfig, HierarchySource, Issue, IssueRef,
    IssueSource, ListOptions, Page, ProjectInfo, SubIssue, TimelineEvent,
};

const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub API client implementing every crawler collaborator.
pub struct GitHubClient {
    http: Client,
    config: GitHubConfig,
    /// `owner/repo` → visibility and per-login push access.
    access_cache: Mutex<HashMap<String, (bool, HashMap<String, bool>)>>,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        let agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| ApiError::Transport(format!("Invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, agent);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        if config.token.is_none() {
            debug!("No GitHub token configured; using anonymous access");
        }

        Ok(Self {
            http,
            config,
            access_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    fn issue_url(&self, owner: &str, repo: &str, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}",
            self.config.api_url.trim_end_matches('/'),
            owner,
            repo,
            number
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.send(self.http.get(url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_page<R, T>(&self, url: &str, opts: ListOptions) -> Result<Page<T>, ApiError>
    where
        R: DeserializeOwned,
        T: From<R>,
    {
        let request = self
            .http
            .get(url)
            .query(&[("per_page", opts.per_page), ("page", opts.page)]);
        let response = self.send(request).await?;
        let next_page = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_page_from_link);
        let raw: Vec<R> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(Page {
            items: raw.into_iter().map(T::from).collect(),
            next_page,
        })
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, ApiError> {
        let body = json!({ "query": query, "variables": variables });
        let request = self.http.post(&self.config.graphql_url).json(&body);
        let response = self.send(request).await?;
        let envelope: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        envelope.into_data()
    }

    async fn repo_access(
        &self,
        username: &str,
        owner: &str,
        repo: &str,
    ) -> Result<RepoAccess, ApiError> {
        let key = repo_key(owner, repo);
        let user = username.to_lowercase();

        if let Some(access) = self.cached_access(&key, &user).await {
            debug!("Access cache hit for {} in {}", username, key);
            return Ok(access);
        }

        // not locked across the query; concurrent misses may both fetch
        let data: AccessData = self
            .graphql(ACCESS_QUERY, access_variables(owner, repo, username))
            .await?;
        let access = data.into_access(username);

        let mut cache = self.access_cache.lock().await;
        let entry = cache
            .entry(key)
            .or_insert_with(|| (access.is_private, HashMap::new()));
        entry.1.insert(user, access.has_push);
        Ok(access)
    }

    async fn cached_access(&self, key: &str, user: &str) -> Option<RepoAccess> {
        let cache = self.access_cache.lock().await;
        let (is_private, users) = cache.get(key)?;
        users.get(user).map(|has_push| RepoAccess {
            is_private: *is_private,
            has_push: *has_push,
        })
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(err.to_string())
    }
}

/// Maps non-2xx responses to `ApiError::Status`, keeping the remaining quota.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let rate_remaining = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if rate_remaining == Some(0) {
        warn!("GitHub rate limit exhausted ({})", status);
    }
    Err(ApiError::status(status.as_u16(), rate_remaining, message))
}

#[async_trait]
impl IssueSource for GitHubClient {
    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, ApiError> {
        let raw: RawIssue = self.get_json(&self.issue_url(owner, repo, number)).await?;
        Ok(raw.into())
    }

    async fn list_sub_issues(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<SubIssue>, ApiError> {
        let url = format!("{}/sub_issues", self.issue_url(owner, repo, number));
        self.get_page::<RawIssue, SubIssue>(&url, opts).await
    }

    async fn list_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<Comment>, ApiError> {
        let url = format!(
            "{}/comments?sort=created&direction=desc",
            self.issue_url(owner, repo, number)
        );
        self.get_page::<RawComment, Comment>(&url, opts).await
    }

    async fn list_timeline(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        opts: ListOptions,
    ) -> Result<Page<TimelineEvent>, ApiError> {
        let url = format!("{}/timeline", self.issue_url(owner, repo, number));
        self.get_page::<RawTimelineEvent, TimelineEvent>(&url, opts)
            .await
    }
}

#[async_trait]
impl HierarchySource for GitHubClient {
    async fn parent_of(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<IssueRef>, ApiError> {
        let data: ParentData = self
            .graphql(PARENT_QUERY, item_variables(owner, repo, number))
            .await?;
        Ok(data.into_parent())
    }

    async fn project_items(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        is_pr: bool,
    ) -> Result<Vec<ProjectInfo>, ApiError> {
        let data: ProjectData = self
            .graphql(&project_query(is_pr), item_variables(owner, repo, number))
            .await?;
        Ok(data.into_projects())
    }
}

#[async_trait]
impl AccessFilter for GitHubClient {
    /// Content is safe when the repository is private or the author can push.
    async fn is_safe_content(
        &self,
        author: &str,
        owner: &str,
        repo: &str,
    ) -> Result<bool, ApiError> {
        let access = self.repo_access(author, owner, repo).await?;
        Ok(access.is_private || access.has_push)
    }
}
