//! Graph assembly: the crawl state turned into a sorted, deduplicated
//! [`IssueGraph`] with a natural-language summary.

use crate::crawler::{until_cancelled, CrawlState, GraphCrawler};
use crate::edge::{GraphEdge, Relation};
use crate::focus::{FocusSource, FocusTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_core::{GraphNode, IssueRef, NodeType, ProjectInfo};

/// The assembled graph around one focus node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueGraph {
    pub focus: IssueRef,
    /// Sorted by depth, then number.
    pub nodes: Vec<GraphNode>,
    /// Unique by `(from, to, relation)`, in discovery order.
    pub edges: Vec<GraphEdge>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus_project: Vec<ProjectInfo>,
    /// Rendered crawl statistics, present in verbose mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_summary: Option<String>,
}

impl IssueGraph {
    pub fn focus_node(&self) -> Option<&GraphNode> {
        let key = self.focus.key();
        self.nodes.iter().find(|node| node.key() == key)
    }
}

impl CrawlState {
    pub(crate) fn build_graph(&self, max_depth: usize, verbose: bool) -> IssueGraph {
        let mut nodes: Vec<GraphNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.reference.number.cmp(&b.reference.number))
        });

        let mut seen = HashSet::new();
        let edges: Vec<GraphEdge> = self
            .edges
            .iter()
            .filter(|edge| seen.insert(edge.key()))
            .cloned()
            .collect();

        IssueGraph {
            focus: self.focus.clone(),
            nodes,
            edges,
            summary: self.summary(),
            focus_project: Vec::new(),
            crawl_summary: verbose.then(|| self.stats.format(max_depth)),
        }
    }

    fn summary(&self) -> String {
        let focus_key = self.focus.key();
        let Some(focus_node) = self.nodes.get(&focus_key) else {
            return "Unable to fetch the requested issue or pull request.".to_string();
        };

        let mut out = String::new();
        let focus_ref = if self.focus.same_repo(&self.original.owner, &self.original.repo) {
            format!("#{}", self.focus.number)
        } else {
            self.focus.to_string()
        };
        let _ = writeln!(
            out,
            "Focus: {} ({}) \"{}\"",
            focus_ref, focus_node.node_type, focus_node.title
        );
        let _ = writeln!(out, "State: {}", focus_node.state_label());

        self.write_focus_shift(&mut out, focus_node);

        let ancestors = self.ancestors(&focus_key);
        if !ancestors.is_empty() {
            out.push_str("Hierarchy: ");
            for key in ancestors.iter().rev() {
                if let Some(node) = self.nodes.get(key) {
                    let _ = write!(
                        out,
                        "{} ({}) → ",
                        node.reference
                            .display_relative(&self.focus.owner, &self.focus.repo),
                        node.node_type
                    );
                }
            }
            let _ = writeln!(out, "#{} ({})", self.focus.number, focus_node.node_type);
        }

        // sub-issue and tasklist discovery may both record the same child
        let children = self
            .edges
            .iter()
            .filter(|edge| edge.relation == Relation::Child && edge.from.key() == focus_key)
            .map(|edge| edge.to.key())
            .collect::<HashSet<_>>()
            .len();
        if children > 0 {
            let _ = writeln!(out, "Direct children: {}", children);
        }

        if let Some(parent) = self.parent_map.get(&focus_key) {
            let siblings = self
                .parent_map
                .iter()
                .filter(|(child, p)| *p == parent && **child != focus_key)
                .count();
            if siblings > 0 {
                let _ = writeln!(out, "Siblings (same parent): {}", siblings);
            }
        }

        out.push('\n');
        let _ = writeln!(
            out,
            "Graph contains {} nodes: {}",
            self.nodes.len(),
            self.type_tally()
        );
        out
    }

    fn write_focus_shift(&self, out: &mut String, focus_node: &GraphNode) {
        let original = self
            .original
            .display_relative(&self.focus.owner, &self.focus.repo);

        match self.focus_source {
            FocusSource::Hierarchy => {
                let _ = writeln!(
                    out,
                    "Focus shifted: from {} via sub-issue/closes hierarchy",
                    original
                );
                return;
            }
            FocusSource::CrossReference => {
                let _ = writeln!(
                    out,
                    "Focus shifted: from {} via cross-reference (found closest matching {} - verify this is the correct parent)",
                    original, focus_node.node_type
                );
                return;
            }
            FocusSource::Provided => {}
        }

        let Some(wanted) = self.focus_requested.node_type() else {
            return;
        };
        if focus_node.node_type == wanted {
            return;
        }

        let requested = self.focus_requested;
        let article = if requested == FocusTarget::Epic { "an" } else { "a" };
        let _ = writeln!(
            out,
            "No {} found: searched hierarchy and cross-references from {}",
            requested, original
        );
        out.push_str("Suggestions:\n");
        let _ = writeln!(
            out,
            "  1. Provide a link: if you know the {}, share owner/repo#number",
            requested
        );
        let _ = writeln!(
            out,
            "  2. Add a link: reference the {} in the issue body using 'Part of owner/repo#N'",
            requested
        );
        let _ = writeln!(
            out,
            "  3. Create {} {}: open a new tracking issue and add this one as a sub-issue",
            article, requested
        );
    }

    fn type_tally(&self) -> String {
        let count = |node_type: NodeType| {
            self.nodes
                .values()
                .filter(|node| node.node_type == node_type)
                .count()
        };
        [
            (count(NodeType::Epic), "epic(s)"),
            (count(NodeType::Batch), "batch issue(s)"),
            (count(NodeType::Task), "task(s)"),
            (count(NodeType::Pr), "PR(s)"),
        ]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, label)| format!("{} {}", n, label))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

impl GraphCrawler {
    /// Assembles the graph. `verbose` adds the crawl statistics block.
    pub async fn build_graph(&self, verbose: bool) -> IssueGraph {
        self.shared
            .state
            .read()
            .await
            .build_graph(self.shared.config.max_depth, verbose)
    }

    /// Looks up project membership of the focus node. Failures are ignored.
    pub async fn attach_project_info(&self, graph: &mut IssueGraph, cancel: &CancellationToken) {
        let Some(hierarchy) = &self.shared.sources.hierarchy else {
            return;
        };
        let is_pr = graph
            .focus_node()
            .map(|node| node.node_type == NodeType::Pr)
            .unwrap_or(false);
        let focus = &graph.focus;

        let query = tokio::time::timeout(
            self.shared.config.project_query_timeout(),
            hierarchy.project_items(&focus.owner, &focus.repo, focus.number, is_pr),
        );
        match until_cancelled(cancel, query).await {
            Some(Ok(Ok(projects))) => {
                graph.focus_project = projects
                    .into_iter()
                    .filter(|p| !p.project_title.is_empty())
                    .collect();
            }
            Some(Ok(Err(err))) => debug!("Project lookup failed for {}: {}", focus, err),
            _ => debug!("Project lookup for {} did not complete", focus),
        }
    }
}
