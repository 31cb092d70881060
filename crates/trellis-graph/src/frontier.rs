//! Priority queue of pending crawl work.
//!
//! Items are served by `(priority, depth, insertion order)`: parent
//! discoveries first, then children, then cross-references, shallower
//! items first within a tier. The insertion sequence makes ties
//! deterministic within a run.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use trellis_core::{IssueRef, NodeKey};

/// Scheduling tier of a crawl item. Lower is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Walking upward gives the most context.
    Parent = 0,
    /// Sub-issues and tasklist links.
    Child = 1,
    /// Mentions and timeline references.
    CrossRef = 2,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Parent => "parent",
            Priority::Child => "child",
            Priority::CrossRef => "cross-ref",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pending unit of crawl work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlItem {
    pub target: IssueRef,
    pub depth: usize,
    pub priority: Priority,
    /// Reached by walking parent links upward; siblings are not expanded.
    pub is_ancestor: bool,
    /// Reached through a mention; fetched but never expanded.
    pub is_cross_ref: bool,
}

impl CrawlItem {
    /// The starting item of a crawl.
    pub fn seed(target: IssueRef) -> Self {
        Self {
            target,
            depth: 0,
            priority: Priority::Child,
            is_ancestor: false,
            is_cross_ref: false,
        }
    }

    pub fn parent(target: IssueRef, depth: usize, is_ancestor: bool) -> Self {
        Self {
            target,
            depth,
            priority: Priority::Parent,
            is_ancestor,
            is_cross_ref: false,
        }
    }

    pub fn child(target: IssueRef, depth: usize) -> Self {
        Self {
            target,
            depth,
            priority: Priority::Child,
            is_ancestor: false,
            is_cross_ref: false,
        }
    }

    pub fn cross_ref(target: IssueRef, depth: usize) -> Self {
        Self {
            target,
            depth,
            priority: Priority::CrossRef,
            is_ancestor: false,
            is_cross_ref: true,
        }
    }

    pub fn key(&self) -> NodeKey {
        self.target.key()
    }
}

struct QueuedItem {
    item: CrawlItem,
    seq: u64,
}

impl QueuedItem {
    fn rank(&self) -> (Priority, usize, u64) {
        (self.item.priority, self.item.depth, self.seq)
    }
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for QueuedItem {}

impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap behaviour
        other.rank().cmp(&self.rank())
    }
}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Crawl frontier with a "queued" de-duplication set.
///
/// The queued set is separate from the visited set kept by the crawler:
/// a key is queued before it is fetched, and stays queued afterwards.
#[derive(Default)]
pub struct Frontier {
    heap: BinaryHeap<QueuedItem>,
    queued: HashSet<NodeKey>,
    next_seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an item unless its key was queued before.
    ///
    /// Returns false for duplicates.
    pub fn push(&mut self, item: CrawlItem) -> bool {
        if !self.queued.insert(item.key()) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedItem { item, seq });
        true
    }

    pub fn pop(&mut self) -> Option<CrawlItem> {
        self.heap.pop().map(|queued| queued.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn was_queued(&self, key: &NodeKey) -> bool {
        self.queued.contains(key)
    }
}
