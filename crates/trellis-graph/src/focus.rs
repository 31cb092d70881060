//! Focus resolution after a crawl.
//!
//! A caller may ask for the graph to be centred on the nearest epic or
//! batch rather than the item it started from. The resolver looks, in
//! order, at:
//!
//! 1. the original focus itself
//! 2. its ancestor chain (an epic request accepts a batch)
//! 3. nodes one `related` hop away, then their ancestors (same fallback)
//!
//! and keeps the original focus when nothing matches.

use crate::crawler::{CrawlState, GraphCrawler};
use crate::edge::Relation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;
use trellis_core::{GraphNode, IssueRef, NodeKey, NodeType};

/// The kind of node the caller wants the graph centred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusTarget {
    /// Keep the item the crawl started from.
    #[default]
    Provided,
    Epic,
    Batch,
}

impl FocusTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusTarget::Provided => "provided",
            FocusTarget::Epic => "epic",
            FocusTarget::Batch => "batch",
        }
    }

    /// Node type to search for; `None` for `Provided`.
    pub fn node_type(&self) -> Option<NodeType> {
        match self {
            FocusTarget::Provided => None,
            FocusTarget::Epic => Some(NodeType::Epic),
            FocusTarget::Batch => Some(NodeType::Batch),
        }
    }
}

impl std::fmt::Display for FocusTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown focus '{0}': expected provided, epic or batch")]
pub struct UnknownFocus(pub String);

impl FromStr for FocusTarget {
    type Err = UnknownFocus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "provided" => Ok(FocusTarget::Provided),
            "epic" => Ok(FocusTarget::Epic),
            "batch" => Ok(FocusTarget::Batch),
            _ => Err(UnknownFocus(s.to_string())),
        }
    }
}

/// How the current focus was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusSource {
    /// The item the caller asked for.
    Provided,
    /// Found by walking sub-issue or closing-reference parents.
    Hierarchy,
    /// Found next to a mention. Best effort.
    CrossReference,
}

impl FocusSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusSource::Provided => "provided",
            FocusSource::Hierarchy => "hierarchy",
            FocusSource::CrossReference => "cross-reference",
        }
    }
}

impl std::fmt::Display for FocusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a focus search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusChoice {
    pub target: IssueRef,
    pub source: FocusSource,
}

impl CrawlState {
    /// Parents, grandparents, ... of `key`, nearest first. Stops on cycles.
    pub(crate) fn ancestors(&self, key: &NodeKey) -> Vec<NodeKey> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        let mut current = key;

        while let Some(parent) = self.parent_map.get(current) {
            if !seen.insert(parent) {
                break;
            }
            ancestors.push(parent.clone());
            current = parent;
        }
        ancestors
    }

    fn first_of_type<'a, I>(&self, keys: I, node_type: NodeType) -> Option<&GraphNode>
    where
        I: IntoIterator<Item = &'a NodeKey>,
    {
        keys.into_iter()
            .filter_map(|key| self.nodes.get(key))
            .find(|node| node.node_type == node_type)
    }

    pub(crate) fn best_focus(&self, target: FocusTarget) -> FocusChoice {
        let keep = FocusChoice {
            target: self.focus.clone(),
            source: FocusSource::Provided,
        };
        let Some(wanted) = target.node_type() else {
            return keep;
        };

        let focus_key = self.focus.key();
        if self
            .nodes
            .get(&focus_key)
            .map(|node| node.node_type == wanted)
            .unwrap_or(false)
        {
            return keep;
        }

        let mut fallbacks = vec![wanted];
        if wanted == NodeType::Epic {
            fallbacks.push(NodeType::Batch);
        }

        let ancestors = self.ancestors(&focus_key);
        for node_type in &fallbacks {
            if let Some(node) = self.first_of_type(&ancestors, *node_type) {
                return FocusChoice {
                    target: node.reference.clone(),
                    source: FocusSource::Hierarchy,
                };
            }
        }

        for node_type in &fallbacks {
            if let Some(node) = self.cross_referenced_node(&focus_key, *node_type) {
                return FocusChoice {
                    target: node.reference.clone(),
                    source: FocusSource::CrossReference,
                };
            }
        }

        keep
    }

    /// A node of `node_type` one `related` hop from `from`, or an ancestor
    /// of such a node.
    pub(crate) fn cross_referenced_node(
        &self,
        from: &NodeKey,
        node_type: NodeType,
    ) -> Option<&GraphNode> {
        if !self.nodes.contains_key(from) {
            return None;
        }

        let neighbours: Vec<NodeKey> = self
            .edges
            .iter()
            .filter(|edge| edge.relation == Relation::Related)
            .filter_map(|edge| edge.other_end(from))
            .map(IssueRef::key)
            .collect();

        if let Some(node) = self.first_of_type(&neighbours, node_type) {
            return Some(node);
        }

        neighbours
            .iter()
            .find_map(|key| self.first_of_type(&self.ancestors(key), node_type))
    }

    pub(crate) fn refocus(&mut self, target: &IssueRef, source: FocusSource) {
        let focus_key = target.key();
        self.focus = target.clone();
        self.focus_source = source;
        for (key, node) in self.nodes.iter_mut() {
            node.is_focus = *key == focus_key;
        }
    }
}

impl GraphCrawler {
    /// Finds the best node to centre the graph on.
    pub async fn find_best_focus(&self, target: FocusTarget) -> FocusChoice {
        self.shared.state.read().await.best_focus(target)
    }

    /// Moves the focus to `target`, flipping `is_focus` accordingly.
    pub async fn refocus_to(&self, target: &IssueRef, source: FocusSource) {
        self.shared.state.write().await.refocus(target, source);
    }

    /// Records the requested focus and refocuses when a better node exists.
    pub async fn apply_focus(&self, target: FocusTarget) -> FocusChoice {
        let mut state = self.shared.state.write().await;
        state.focus_requested = target;
        let choice = state.best_focus(target);
        if choice.target.key() != state.focus.key() {
            state.refocus(&choice.target, choice.source);
        }
        choice
    }
}
