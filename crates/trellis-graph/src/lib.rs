//! Trellis Graph - issue relationship crawling
//!
//! This crate walks outward from one GitHub issue or pull request and
//! builds the graph of work items around it: parents, sub-issues, tasklist
//! links and cross-references.
//!
//! # Architecture
//!
//! A [`GraphCrawler`] runs a bounded pool of worker tasks fed from a
//! priority [`Frontier`]. Parent discoveries are served first, then
//! children, then cross-references. After the crawl, the focus can be
//! moved to a nearby epic or batch and the state is assembled into an
//! [`IssueGraph`], which [`format_graph_output`] renders as text.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use trellis_core::{CrawlConfig, IssueRef, IssueSource};
//! use trellis_graph::{build_issue_graph, format_graph_output, IssueGraphRequest, Sources};
//!
//! # async fn run(api: Arc<dyn IssueSource>) -> Result<(), trellis_graph::CrawlError> {
//! let request = IssueGraphRequest::new(IssueRef::new("octo", "app", 42));
//! let graph = build_issue_graph(
//!     Sources::new(api),
//!     CrawlConfig::default(),
//!     &request,
//!     &CancellationToken::new(),
//! )
//! .await?;
//! println!("{}", format_graph_output(&graph));
//! # Ok(())
//! # }
//! ```

mod assembler;
mod crawler;
mod discovery;
mod edge;
mod error;
mod fetch;
mod focus;
mod frontier;
mod pipeline;
mod render;
mod stats;

pub use assembler::IssueGraph;
pub use crawler::{GraphCrawler, Sources};
pub use edge::{GraphEdge, Relation};
pub use error::CrawlError;
pub use focus::{FocusChoice, FocusSource, FocusTarget, UnknownFocus};
pub use frontier::{CrawlItem, Frontier, Priority};
pub use pipeline::{build_issue_graph, IssueGraphRequest};
pub use render::{format_graph_output, format_node_ref};
pub use stats::CrawlStats;
