//! Crawl orchestration.
//!
//! A single dispatch loop owns the [`Frontier`] and feeds a fixed pool of
//! worker tasks over a bounded channel. Workers fetch one node, run link
//! discovery and send the newly found items back on a results channel.
//! All graph state lives in one [`CrawlState`] behind a `tokio` `RwLock`.
//!
//! ```text
//!   Frontier ──pop──▶ dispatch ──jobs──▶ worker × N ──results──▶ dispatch ──push──▶ Frontier
//! ```

use crate::edge::GraphEdge;
use crate::error::CrawlError;
use crate::focus::{FocusSource, FocusTarget};
use crate::frontier::{CrawlItem, Frontier};
use crate::stats::CrawlStats;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_core::{
    repo_key, AccessFilter, CrawlConfig, GraphNode, HierarchySource, IssueRef, IssueSource,
    NodeKey,
};

/// The collaborators a crawl talks to.
#[derive(Clone)]
pub struct Sources {
    pub issues: Arc<dyn IssueSource>,
    pub hierarchy: Option<Arc<dyn HierarchySource>>,
    pub access: Option<Arc<dyn AccessFilter>>,
}

impl Sources {
    pub fn new(issues: Arc<dyn IssueSource>) -> Self {
        Self {
            issues,
            hierarchy: None,
            access: None,
        }
    }

    /// Enables parent-link discovery and project lookups.
    pub fn with_hierarchy(mut self, hierarchy: Arc<dyn HierarchySource>) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    /// Enables the safe-content check used in lockdown mode.
    pub fn with_access_filter(mut self, access: Arc<dyn AccessFilter>) -> Self {
        self.access = Some(access);
        self
    }
}

/// Everything a crawl accumulates.
///
/// Created fresh per crawl and discarded after the graph is rendered.
pub(crate) struct CrawlState {
    pub(crate) focus: IssueRef,
    pub(crate) original: IssueRef,
    pub(crate) focus_source: FocusSource,
    pub(crate) focus_requested: FocusTarget,
    pub(crate) nodes: HashMap<NodeKey, GraphNode>,
    pub(crate) edges: Vec<GraphEdge>,
    /// child → parent
    pub(crate) parent_map: HashMap<NodeKey, NodeKey>,
    pub(crate) inaccessible_repos: HashSet<String>,
    pub(crate) stats: CrawlStats,
}

impl CrawlState {
    pub(crate) fn new(focus: IssueRef) -> Self {
        Self {
            original: focus.clone(),
            focus,
            focus_source: FocusSource::Provided,
            focus_requested: FocusTarget::Provided,
            nodes: HashMap::new(),
            edges: Vec::new(),
            parent_map: HashMap::new(),
            inaccessible_repos: HashSet::new(),
            stats: CrawlStats::default(),
        }
    }

    pub(crate) fn is_repo_inaccessible(&self, target: &IssueRef) -> bool {
        self.inaccessible_repos.contains(&target.repo_key())
    }

    /// Records a parent link. Later claims overwrite earlier ones.
    pub(crate) fn set_parent(&mut self, child: NodeKey, parent: NodeKey) {
        if let Some(previous) = self.parent_map.insert(child.clone(), parent.clone()) {
            if previous != parent {
                debug!("Parent of {} changed from {} to {}", child, previous, parent);
            }
        }
    }
}

pub(crate) struct Shared {
    pub(crate) sources: Sources,
    pub(crate) config: CrawlConfig,
    pub(crate) fetch_permits: Semaphore,
    pub(crate) state: RwLock<CrawlState>,
}

/// Outcome of processing one crawl item.
pub(crate) struct CrawlResult {
    pub(crate) node: Option<GraphNode>,
    pub(crate) new_items: Vec<CrawlItem>,
    pub(crate) error: Option<CrawlError>,
}

impl CrawlResult {
    pub(crate) fn empty() -> Self {
        Self {
            node: None,
            new_items: Vec::new(),
            error: None,
        }
    }
}

/// Concurrent relationship-graph crawler rooted at one issue or PR.
///
/// Cloning is cheap; clones share the same crawl state.
#[derive(Clone)]
pub struct GraphCrawler {
    pub(crate) shared: Arc<Shared>,
}

impl GraphCrawler {
    pub fn new(sources: Sources, config: CrawlConfig, focus: IssueRef) -> Self {
        let permits = config.max_concurrent_fetches.max(1);
        Self {
            shared: Arc::new(Shared {
                sources,
                config,
                fetch_permits: Semaphore::new(permits),
                state: RwLock::new(CrawlState::new(focus)),
            }),
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.shared.config
    }

    /// Current focus of the graph.
    pub async fn focus(&self) -> IssueRef {
        self.shared.state.read().await.focus.clone()
    }

    /// Snapshot of the crawl statistics.
    pub async fn stats(&self) -> CrawlStats {
        self.shared.state.read().await.stats.clone()
    }

    /// Crawls outward from the focus until the frontier is exhausted or
    /// `cancel` fires.
    ///
    /// On cancellation the nodes gathered so far remain in the crawler and
    /// `CrawlError::Cancelled` is returned.
    pub async fn crawl(&self, cancel: &CancellationToken) -> Result<(), CrawlError> {
        let workers = self.shared.config.max_concurrent_fetches.max(1);
        let (job_tx, job_rx) = mpsc::channel::<CrawlItem>(workers * 2);
        let (result_tx, mut result_rx) = mpsc::channel::<CrawlResult>(workers * 2);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let crawler = self.clone();
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                crawler.run_worker(worker_id, job_rx, result_tx, cancel).await;
            }));
        }
        drop(result_tx);

        let focus = self.focus().await;
        info!("Crawling issue graph from {}", focus);

        let mut frontier = Frontier::new();
        frontier.push(CrawlItem::seed(focus));
        let mut in_flight = 0usize;

        let outcome = 'dispatch: loop {
            if cancel.is_cancelled() {
                break 'dispatch Err(CrawlError::Cancelled);
            }

            while in_flight < workers {
                let Some(item) = frontier.pop() else {
                    break;
                };
                if !self.admit(&item).await {
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'dispatch Err(CrawlError::Cancelled),
                    sent = job_tx.send(item) => {
                        if sent.is_err() {
                            break 'dispatch Err(CrawlError::Cancelled);
                        }
                        in_flight += 1;
                    }
                }
            }

            if frontier.is_empty() && in_flight == 0 {
                break 'dispatch Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'dispatch Err(CrawlError::Cancelled),
                received = result_rx.recv() => match received {
                    Some(result) => {
                        in_flight -= 1;
                        self.absorb(result, &mut frontier).await;
                    }
                    None => break 'dispatch Ok(()),
                }
            }
        };

        if outcome.is_err() {
            self.shared.state.write().await.stats.timed_out = true;
        }

        // Let workers see the closed queue, then drain whatever they still send.
        drop(job_tx);
        while result_rx.recv().await.is_some() {}
        for handle in handles {
            let _ = handle.await;
        }

        let state = self.shared.state.read().await;
        info!(
            "Crawl finished: {} nodes, {} edges{}",
            state.nodes.len(),
            state.edges.len(),
            if outcome.is_err() { " (incomplete)" } else { "" }
        );
        outcome
    }

    /// Crawls with a wall-clock deadline.
    ///
    /// Returns `CrawlError::DeadlineExceeded` when the deadline, rather than
    /// `parent`, stopped the crawl.
    pub async fn crawl_with_timeout(
        &self,
        parent: &CancellationToken,
        timeout: Duration,
    ) -> Result<(), CrawlError> {
        let token = parent.child_token();
        let expired = Arc::new(AtomicBool::new(false));

        let timer = {
            let token = token.clone();
            let expired = Arc::clone(&expired);
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        expired.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                }
            })
        };

        let result = self.crawl(&token).await;
        token.cancel();
        let _ = timer.await;

        match result {
            Err(CrawlError::Cancelled) if expired.load(Ordering::SeqCst) => {
                Err(CrawlError::DeadlineExceeded)
            }
            other => other,
        }
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        jobs: Arc<Mutex<mpsc::Receiver<CrawlItem>>>,
        results: mpsc::Sender<CrawlResult>,
        cancel: CancellationToken,
    ) {
        loop {
            let next = {
                let mut rx = jobs.lock().await;
                rx.recv().await
            };
            let Some(item) = next else {
                break;
            };

            debug!("Worker {} processing {}", worker_id, item.target);
            let result = self.process_item(&item, &cancel).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = results.send(result) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Dispatch-time filter. Check and bookkeeping happen under one lock.
    async fn admit(&self, item: &CrawlItem) -> bool {
        let mut state = self.shared.state.write().await;
        let key = item.key();

        if state.nodes.contains_key(&key) {
            state.stats.nodes_skipped += 1;
            return false;
        }
        if state.is_repo_inaccessible(&item.target) {
            debug!("Skipping {}: repository inaccessible", item.target);
            return false;
        }
        if item.depth > self.shared.config.max_depth {
            debug!("Skipping {}: depth {} beyond limit", item.target, item.depth);
            return false;
        }

        state.stats.depth_reached = state.stats.depth_reached.max(item.depth);
        state
            .stats
            .repos_accessed
            .insert(repo_key(&item.target.owner, &item.target.repo));
        true
    }

    async fn absorb(&self, result: CrawlResult, frontier: &mut Frontier) {
        if result.error.is_some() || result.node.is_none() {
            return;
        }
        self.shared.state.write().await.stats.nodes_fetched += 1;

        for item in result.new_items {
            frontier.push(item);
        }
    }
}

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn until_cancelled<F>(cancel: &CancellationToken, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}
