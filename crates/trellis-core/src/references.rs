//! Reference extraction from issue and pull request bodies.
//!
//! Recognises four reference shapes:
//!
//! - `closes #12`, `fixes owner/repo#12`, `resolves #12` (marks the target as parent)
//! - `owner/repo#12`
//! - `https://github.com/owner/repo/issues/12` and `/pull/12`
//! - `#12` in the current repository
//!
//! Fenced and inline code is stripped before matching so that examples in
//! code blocks do not leak into the graph.

use crate::node::{NodeKey, TasklistItem};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static SAME_REPO_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\w])#(\d+)").expect("valid regex"));

static CROSS_REPO_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-zA-Z0-9](?:[a-zA-Z0-9._-]*[a-zA-Z0-9])?)/([a-zA-Z0-9._-]+)#(\d+)")
        .expect("valid regex")
});

static GITHUB_URL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"https?://(?:www\.)?github\.com/([a-zA-Z0-9](?:[a-zA-Z0-9._-]*[a-zA-Z0-9])?)/([a-zA-Z0-9._-]+)/(?:issues|pull)/(\d+)",
    )
    .expect("valid regex")
});

static CLOSES_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+(?:(?:([a-zA-Z0-9](?:[a-zA-Z0-9._-]*[a-zA-Z0-9])?)/([a-zA-Z0-9._-]+))?#(\d+))",
    )
    .expect("valid regex")
});

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```[^`]*```").expect("valid regex"));

static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").expect("valid regex"));

static TASKLIST_CHECKBOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[\t ]*[-*][\t ]+\[([ xX])\][\t ]+(.+?)$").expect("valid regex")
});

/// A reference to an issue or PR found in free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueReference {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    /// Set for `closes`/`fixes`/`resolves` references: the target is the
    /// parent of the item whose body contained the reference.
    #[serde(default)]
    pub is_parent: bool,
}

impl IssueReference {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.owner, &self.repo, self.number)
    }
}

/// Removes fenced code blocks, then inline code spans.
pub fn strip_code_blocks(text: &str) -> String {
    let without_fenced = FENCED_CODE.replace_all(text, "");
    INLINE_CODE.replace_all(&without_fenced, "").into_owned()
}

/// Extracts every issue/PR reference from `text`.
///
/// References are returned in discovery order: closing references first,
/// then cross-repo, URL and finally same-repo references. Each target
/// appears once; the first shape that matched it wins.
pub fn extract_issue_references(
    text: &str,
    default_owner: &str,
    default_repo: &str,
) -> Vec<IssueReference> {
    let text = strip_code_blocks(text);
    let mut collector = RefCollector::default();

    for caps in CLOSES_REF.captures_iter(&text) {
        let (owner, repo) = match (caps.get(1), caps.get(2)) {
            (Some(o), Some(r)) if !o.as_str().is_empty() && !r.as_str().is_empty() => {
                (o.as_str(), r.as_str())
            }
            _ => (default_owner, default_repo),
        };
        collector.push(owner, repo, &caps[3], true);
    }

    for caps in CROSS_REPO_REF.captures_iter(&text) {
        collector.push(&caps[1], &caps[2], &caps[3], false);
    }

    for caps in GITHUB_URL_REF.captures_iter(&text) {
        collector.push(&caps[1], &caps[2], &caps[3], false);
    }

    for caps in SAME_REPO_REF.captures_iter(&text) {
        collector.push(default_owner, default_repo, &caps[1], false);
    }

    collector.refs
}

#[derive(Default)]
struct RefCollector {
    refs: Vec<IssueReference>,
    seen: HashSet<NodeKey>,
}

impl RefCollector {
    fn push(&mut self, owner: &str, repo: &str, number: &str, is_parent: bool) {
        let number = match number.parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => return,
        };
        if self.seen.insert(NodeKey::new(owner, repo, number)) {
            self.refs.push(IssueReference {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number,
                is_parent,
            });
        }
    }
}

/// Extracts markdown checkbox items (`- [ ] text`, `* [x] text`) from a body.
///
/// Each item links to the first reference found in its text, if any.
pub fn extract_tasklist_items(
    body: &str,
    default_owner: &str,
    default_repo: &str,
) -> Vec<TasklistItem> {
    TASKLIST_CHECKBOX
        .captures_iter(body)
        .filter_map(|caps| {
            let text = caps[2].trim();
            if text.is_empty() {
                return None;
            }
            let linked_ref = extract_issue_references(text, default_owner, default_repo)
                .into_iter()
                .next();
            Some(TasklistItem {
                text: text.to_string(),
                completed: matches!(&caps[1], "x" | "X"),
                linked_ref,
            })
        })
        .collect()
}
