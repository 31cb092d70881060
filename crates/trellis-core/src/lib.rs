//! Trellis Core - data model and text extraction for issue graphs
//!
//! This crate holds everything the crawler needs that does not involve
//! concurrency: the node model, reference and tasklist extraction, status
//! keyword scanning, body previews, and the traits through which the
//! crawler reaches the issue tracker.
//!
//! # Example
//!
//! ```
//! use trellis_core::extract_issue_references;
//!
//! let refs = extract_issue_references("Fixes #12, see octo/cat#3", "octo", "dog");
//! assert_eq!(refs.len(), 2);
//! assert!(refs[0].is_parent);
//! ```

pub mod config;
pub mod error;
pub mod node;
pub mod references;
pub mod source;
pub mod text;

pub use config::{CrawlConfig, GitHubConfig, TrellisConfig};
pub use error::{ApiError, ConfigError, FailureKind, TargetParseError};
pub use node::{
    classify_node, repo_key, GraphNode, IssueRef, NodeKey, NodeType, ProjectInfo, TasklistItem,
};
pub use references::{
    extract_issue_references, extract_tasklist_items, strip_code_blocks, IssueReference,
};
pub use source::{
    AccessFilter, Comment, HierarchySource, Issue, IssueSource, ListOptions, Milestone, Page,
    PullRequestLinks, SourceIssue, SubIssue, TimelineEvent,
};
pub use text::{
    body_lines_for_depth, extract_status_update, max_line_len_for_depth, merge_comment_status,
    sanitize_body, truncate_with_ellipsis,
};
