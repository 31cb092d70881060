//! Node fetching: one issue or PR, memoized per key.

use crate::crawler::{until_cancelled, GraphCrawler};
use crate::error::CrawlError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trellis_core::{
    body_lines_for_depth, classify_node, extract_status_update, extract_tasklist_items,
    max_line_len_for_depth, merge_comment_status, sanitize_body, FailureKind, GraphNode, Issue,
    IssueRef, ListOptions,
};

/// What a fetch produced.
pub(crate) enum Fetched {
    /// First visit; the raw issue is available for link discovery.
    Fresh { node: GraphNode, issue: Issue },
    /// Already in the graph. Discovery happened on the first visit.
    Known(GraphNode),
    /// Dropped without failing the crawl.
    Skipped,
}

impl GraphCrawler {
    /// Fetches `target`, classifies it and stores it in the graph.
    ///
    /// Only cancellation is an error; every other failure is a soft skip.
    pub(crate) async fn fetch_node(
        &self,
        target: &IssueRef,
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<Fetched, CrawlError> {
        let key = target.key();
        {
            let state = self.shared.state.read().await;
            if let Some(node) = state.nodes.get(&key) {
                return Ok(Fetched::Known(node.clone()));
            }
            if state.is_repo_inaccessible(target) {
                return Ok(Fetched::Skipped);
            }
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            permit = self.shared.fetch_permits.acquire() => {
                permit.map_err(|_| CrawlError::Cancelled)?
            }
        };

        let Some(issue) = self.get_issue_with_retry(target, cancel).await? else {
            return Ok(Fetched::Skipped);
        };

        if !self.passes_access_filter(target, &issue, cancel).await? {
            debug!("Skipping {}: content filtered", target);
            return Ok(Fetched::Skipped);
        }

        let node = self.build_node(target, &issue, depth, cancel).await;

        let mut state = self.shared.state.write().await;
        if let Some(existing) = state.nodes.get(&key) {
            return Ok(Fetched::Known(existing.clone()));
        }
        let mut node = node;
        node.is_focus = key == state.focus.key();
        state.nodes.insert(key, node.clone());
        Ok(Fetched::Fresh { node, issue })
    }

    /// Gets the issue, backing off on rate limits.
    ///
    /// `Ok(None)` is a soft skip.
    async fn get_issue_with_retry(
        &self,
        target: &IssueRef,
        cancel: &CancellationToken,
    ) -> Result<Option<Issue>, CrawlError> {
        let config = &self.shared.config;
        let issues = &self.shared.sources.issues;
        let mut attempt = 0u32;

        loop {
            let response = until_cancelled(
                cancel,
                issues.get_issue(&target.owner, &target.repo, target.number),
            )
            .await
            .ok_or(CrawlError::Cancelled)?;

            let err = match response {
                Ok(issue) => return Ok(Some(issue)),
                Err(err) => err,
            };

            match err.disposition() {
                FailureKind::RateLimited => {
                    self.shared.state.write().await.stats.rate_limit_hits += 1;
                    if attempt >= config.max_rate_limit_retries {
                        warn!("Giving up on {} after {} rate-limited attempts", target, attempt + 1);
                        return Ok(None);
                    }
                    let backoff = config.backoff_for_attempt(attempt);
                    debug!("Rate limited on {}, backing off {:?}", target, backoff);
                    attempt += 1;
                    until_cancelled(cancel, tokio::time::sleep(backoff))
                        .await
                        .ok_or(CrawlError::Cancelled)?;
                }
                FailureKind::RepoInaccessible => {
                    warn!("Marking {}/{} inaccessible: {}", target.owner, target.repo, err);
                    self.shared
                        .state
                        .write()
                        .await
                        .inaccessible_repos
                        .insert(target.repo_key());
                    return Ok(None);
                }
                FailureKind::Other => {
                    warn!("Failed to fetch {}: {}", target, err);
                    return Ok(None);
                }
            }
        }
    }

    async fn passes_access_filter(
        &self,
        target: &IssueRef,
        issue: &Issue,
        cancel: &CancellationToken,
    ) -> Result<bool, CrawlError> {
        if !self.shared.config.lockdown_mode || issue.author.is_empty() {
            return Ok(true);
        }
        let Some(access) = &self.shared.sources.access else {
            return Ok(true);
        };

        let verdict = until_cancelled(
            cancel,
            access.is_safe_content(&issue.author, &target.owner, &target.repo),
        )
        .await
        .ok_or(CrawlError::Cancelled)?;

        match verdict {
            Ok(safe) => Ok(safe),
            Err(err) => {
                warn!("Could not verify content safety for {}: {}", target, err);
                Ok(false)
            }
        }
    }

    async fn build_node(
        &self,
        target: &IssueRef,
        issue: &Issue,
        depth: usize,
        cancel: &CancellationToken,
    ) -> GraphNode {
        let is_pr = issue.is_pull_request();
        let has_sub_issues = !is_pr && self.has_any_sub_issue(target, cancel).await;
        let node_type = classify_node(
            is_pr,
            &issue.labels,
            &issue.title,
            issue.issue_type.as_deref(),
            has_sub_issues,
        );

        let (state, state_reason) = if issue.is_merged() {
            ("merged".to_string(), "merged".to_string())
        } else if is_pr {
            (issue.state.clone(), String::new())
        } else {
            (issue.state.clone(), issue.state_reason.clone().unwrap_or_default())
        };

        let (status_update, tasklist_items) = if node_type.is_tracking() {
            (
                self.status_with_comments(target, issue, cancel).await,
                extract_tasklist_items(&issue.body, &target.owner, &target.repo),
            )
        } else {
            (String::new(), Vec::new())
        };

        GraphNode {
            reference: target.clone(),
            node_type,
            state,
            state_reason,
            status_update,
            title: issue.title.clone(),
            body_preview: sanitize_body(
                &issue.body,
                body_lines_for_depth(depth),
                max_line_len_for_depth(depth),
            ),
            tasklist_items,
            depth,
            is_focus: false,
        }
    }

    async fn has_any_sub_issue(
        &self,
        target: &IssueRef,
        cancel: &CancellationToken,
    ) -> bool {
        let listing = self.shared.sources.issues.list_sub_issues(
            &target.owner,
            &target.repo,
            target.number,
            ListOptions::per_page(1),
        );
        matches!(
            until_cancelled(cancel, listing).await,
            Some(Ok(page)) if !page.items.is_empty()
        )
    }

    /// Body and milestone status, combined with the most recent comments.
    async fn status_with_comments(
        &self,
        target: &IssueRef,
        issue: &Issue,
        cancel: &CancellationToken,
    ) -> String {
        let body_status = extract_status_update(&issue.body, issue.milestone.as_ref());

        let listing = self.shared.sources.issues.list_comments(
            &target.owner,
            &target.repo,
            target.number,
            ListOptions::per_page(self.shared.config.comment_page_size),
        );
        match until_cancelled(cancel, listing).await {
            Some(Ok(page)) => {
                merge_comment_status(&body_status, page.items.iter().map(|c| c.body.as_str()))
            }
            Some(Err(err)) => {
                debug!("Could not list comments for {}: {}", target, err);
                body_status
            }
            None => body_status,
        }
    }
}
