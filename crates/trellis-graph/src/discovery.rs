//! Link discovery: turns a freshly fetched node into new crawl items.
//!
//! Sources, in order:
//!
//! 1. GraphQL parent link (issues only)
//! 2. REST sub-issues (issues only, not for ancestors)
//! 3. Legacy tasklist links (not for ancestors)
//! 4. Free-text body references
//! 5. Timeline cross-references (focus node only)
//!
//! Nodes at the depth limit and nodes reached through a cross-reference
//! are fetched but never expanded.

use crate::crawler::{until_cancelled, CrawlResult, GraphCrawler};
use crate::edge::{GraphEdge, Relation};
use crate::fetch::Fetched;
use crate::frontier::CrawlItem;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_core::{
    extract_issue_references, ApiError, GraphNode, Issue, IssueRef, ListOptions, Page,
};

impl GraphCrawler {
    /// Worker body: fetch one item, then discover its links.
    pub(crate) async fn process_item(
        &self,
        item: &CrawlItem,
        cancel: &CancellationToken,
    ) -> CrawlResult {
        let mut result = CrawlResult::empty();

        let (node, issue) = match self.fetch_node(&item.target, item.depth, cancel).await {
            Err(err) => {
                result.error = Some(err);
                return result;
            }
            Ok(Fetched::Skipped) => return result,
            Ok(Fetched::Known(node)) => {
                result.node = Some(node);
                return result;
            }
            Ok(Fetched::Fresh { node, issue }) => (node, issue),
        };

        if item.depth >= self.shared.config.max_depth || item.is_cross_ref {
            result.node = Some(node);
            return result;
        }

        let mut found = Vec::new();
        if !issue.is_pull_request() {
            self.discover_parent(item, cancel, &mut found).await;
            if !item.is_ancestor {
                self.discover_sub_issues(item, cancel, &mut found).await;
            }
        }
        if !item.is_ancestor {
            self.discover_tasklist_links(item, &node, &mut found).await;
        }
        self.discover_body_references(item, &issue, &mut found).await;
        if node.is_focus {
            self.discover_timeline(item, cancel, &mut found).await;
        }

        debug!("{} yielded {} new items", item.target, found.len());
        result.node = Some(node);
        result.new_items = found;
        result
    }

    async fn discover_parent(
        &self,
        item: &CrawlItem,
        cancel: &CancellationToken,
        found: &mut Vec<CrawlItem>,
    ) {
        let Some(hierarchy) = &self.shared.sources.hierarchy else {
            return;
        };
        let target = &item.target;
        let query = tokio::time::timeout(
            self.shared.config.parent_query_timeout(),
            hierarchy.parent_of(&target.owner, &target.repo, target.number),
        );

        let parent = match until_cancelled(cancel, query).await {
            Some(Ok(Ok(Some(parent)))) => parent,
            Some(Ok(Err(err))) => {
                debug!("Parent query failed for {}: {}", target, err);
                return;
            }
            _ => return,
        };

        {
            let mut state = self.shared.state.write().await;
            state.set_parent(item.key(), parent.key());
            state
                .edges
                .push(GraphEdge::new(target.clone(), parent.clone(), Relation::Parent));
        }
        found.push(CrawlItem::parent(parent, item.depth, true));
    }

    async fn discover_sub_issues(
        &self,
        item: &CrawlItem,
        cancel: &CancellationToken,
        found: &mut Vec<CrawlItem>,
    ) {
        let target = &item.target;
        let issues = &self.shared.sources.issues;
        let page_size = self.shared.config.sub_issue_page_size;

        let subs = self
            .collect_pages(cancel, page_size, |opts| {
                issues.list_sub_issues(&target.owner, &target.repo, target.number, opts)
            })
            .await
            .unwrap_or_default();
        if subs.is_empty() {
            return;
        }

        let key = item.key();
        let mut state = self.shared.state.write().await;
        for sub in subs {
            let child = sub.resolve(&target.owner, &target.repo);
            state.set_parent(child.key(), key.clone());
            state
                .edges
                .push(GraphEdge::new(target.clone(), child.clone(), Relation::Child));
            state.stats.sub_issues_crawled += 1;
            found.push(CrawlItem::child(child, item.depth + 1));
        }
    }

    async fn discover_tasklist_links(
        &self,
        item: &CrawlItem,
        node: &GraphNode,
        found: &mut Vec<CrawlItem>,
    ) {
        if node.tasklist_items.is_empty() {
            return;
        }
        let key = item.key();
        let mut state = self.shared.state.write().await;

        for linked in node.tasklist_items.iter().filter_map(|t| t.linked_ref.as_ref()) {
            let child = IssueRef::from(linked);
            let child_key = child.key();
            if state.is_repo_inaccessible(&child)
                || child_key == key
                || state.nodes.contains_key(&child_key)
            {
                continue;
            }
            state.set_parent(child_key, key.clone());
            state
                .edges
                .push(GraphEdge::new(item.target.clone(), child.clone(), Relation::Child));
            state.stats.tasklist_refs_crawled += 1;
            found.push(CrawlItem::child(child, item.depth + 1));
        }
    }

    async fn discover_body_references(
        &self,
        item: &CrawlItem,
        issue: &Issue,
        found: &mut Vec<CrawlItem>,
    ) {
        let refs = extract_issue_references(&issue.body, &item.target.owner, &item.target.repo);
        if refs.is_empty() {
            return;
        }
        let key = item.key();
        let mut state = self.shared.state.write().await;

        for reference in refs {
            let other = IssueRef::from(&reference);
            let other_key = other.key();
            if state.is_repo_inaccessible(&other) || other_key == key {
                continue;
            }

            if reference.is_parent {
                // "closes #N": N is this item's parent, at the same level
                state.set_parent(key.clone(), other_key);
                state
                    .edges
                    .push(GraphEdge::new(item.target.clone(), other.clone(), Relation::Parent));
                found.push(CrawlItem::parent(other, item.depth, false));
            } else {
                state
                    .edges
                    .push(GraphEdge::new(item.target.clone(), other.clone(), Relation::Related));
                found.push(CrawlItem::cross_ref(other, item.depth + 1));
            }
        }
    }

    async fn discover_timeline(
        &self,
        item: &CrawlItem,
        cancel: &CancellationToken,
        found: &mut Vec<CrawlItem>,
    ) {
        let target = &item.target;
        let issues = &self.shared.sources.issues;
        let page_size = self.shared.config.timeline_page_size;

        let Some(events) = self
            .collect_pages(cancel, page_size, |opts| {
                issues.list_timeline(&target.owner, &target.repo, target.number, opts)
            })
            .await
        else {
            return;
        };

        let key = item.key();
        let mut state = self.shared.state.write().await;
        state.stats.timelines_checked += 1;

        for event in events {
            if event.event != "cross-referenced" {
                continue;
            }
            let Some(source) = event.source else {
                continue;
            };
            let referrer = source.resolve(&target.owner, &target.repo);
            if state.is_repo_inaccessible(&referrer) || referrer.key() == key {
                continue;
            }
            state
                .edges
                .push(GraphEdge::new(referrer.clone(), target.clone(), Relation::Related));
            state.stats.cross_refs_found += 1;
            found.push(CrawlItem::cross_ref(referrer, item.depth + 1));
        }
    }

    /// Collects a listing across pages, up to `max_list_pages`.
    ///
    /// `None` when the first page fails or the crawl is cancelled; a failed
    /// later page keeps what was already collected.
    async fn collect_pages<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        page_size: u32,
        fetch: F,
    ) -> Option<Vec<T>>
    where
        F: Fn(ListOptions) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>>,
    {
        let first = ListOptions::per_page(page_size);
        let page = match until_cancelled(cancel, fetch(first)).await? {
            Ok(page) => page,
            Err(err) => {
                debug!("Listing failed: {}", err);
                return None;
            }
        };

        let mut items = page.items;
        let mut next_page = page.next_page;
        let mut pages = 1;
        while let Some(page_no) = next_page {
            if pages >= self.shared.config.max_list_pages {
                break;
            }
            match until_cancelled(cancel, fetch(first.next(page_no))).await {
                Some(Ok(page)) => {
                    items.extend(page.items);
                    next_page = page.next_page;
                    pages += 1;
                }
                _ => break,
            }
        }
        Some(items)
    }
}
