//! One-call entry point: crawl, refocus, assemble and look up projects.

use crate::assembler::IssueGraph;
use crate::crawler::{GraphCrawler, Sources};
use crate::error::CrawlError;
use crate::focus::FocusTarget;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trellis_core::{CrawlConfig, IssueRef};

/// What to build a graph around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueGraphRequest {
    pub target: IssueRef,
    pub focus: FocusTarget,
    /// Adds the crawl statistics block.
    pub verbose: bool,
}

impl IssueGraphRequest {
    pub fn new(target: IssueRef) -> Self {
        Self {
            target,
            focus: FocusTarget::Provided,
            verbose: false,
        }
    }

    pub fn with_focus(mut self, focus: FocusTarget) -> Self {
        self.focus = focus;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Builds the relationship graph for `request`.
///
/// The crawl runs under `config.crawl_timeout_ms`. Hitting that deadline
/// still yields the partial graph; cancellation by `cancel` is an error.
pub async fn build_issue_graph(
    sources: Sources,
    config: CrawlConfig,
    request: &IssueGraphRequest,
    cancel: &CancellationToken,
) -> Result<IssueGraph, CrawlError> {
    let timeout = config.crawl_timeout();
    let crawler = GraphCrawler::new(sources, config, request.target.clone());

    match crawler.crawl_with_timeout(cancel, timeout).await {
        Ok(()) => {}
        Err(CrawlError::DeadlineExceeded) => {
            warn!("Crawl of {} hit its {:?} deadline", request.target, timeout);
        }
        Err(err) => return Err(err),
    }

    if request.focus != FocusTarget::Provided {
        let choice = crawler.apply_focus(request.focus).await;
        if choice.target.key() != request.target.key() {
            info!(
                "Focus moved from {} to {} ({})",
                request.target, choice.target, choice.source
            );
        }
    }

    let mut graph = crawler.build_graph(request.verbose).await;
    crawler.attach_project_info(&mut graph, cancel).await;
    Ok(graph)
}
