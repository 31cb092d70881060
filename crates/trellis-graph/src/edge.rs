//! Edge types for the issue graph.
//!
//! Edges are recorded as they are discovered and may repeat; the
//! assembler collapses identical `(from, to, relation)` triples.

use serde::{Deserialize, Serialize};
use trellis_core::{IssueRef, NodeKey};

/// The relationship an edge expresses, read from `from`'s point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// `to` is the parent of `from` (GraphQL parent link or a closing reference).
    Parent,

    /// `to` is a child of `from` (sub-issue or tasklist link).
    Child,

    /// Mention or timeline cross-reference.
    Related,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Child => "child",
            Self::Related => "related",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge between two work items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: IssueRef,
    pub to: IssueRef,
    pub relation: Relation,
}

impl GraphEdge {
    pub fn new(from: IssueRef, to: IssueRef, relation: Relation) -> Self {
        Self { from, to, relation }
    }

    /// Case-insensitive identity used for deduplication.
    pub fn key(&self) -> String {
        format!("{}->{}:{}", self.from.key(), self.to.key(), self.relation)
    }

    /// Returns the endpoint opposite `key`, if the edge touches it.
    pub fn other_end(&self, key: &NodeKey) -> Option<&IssueRef> {
        if &self.from.key() == key {
            Some(&self.to)
        } else if &self.to.key() == key {
            Some(&self.from)
        } else {
            None
        }
    }

    /// Parent → child view of a hierarchy edge.
    ///
    /// Parent edges point child → parent, so they are flipped.
    pub fn as_parent_child(&self) -> Option<(&IssueRef, &IssueRef)> {
        match self.relation {
            Relation::Child => Some((&self.from, &self.to)),
            Relation::Parent => Some((&self.to, &self.from)),
            Relation::Related => None,
        }
    }
}
