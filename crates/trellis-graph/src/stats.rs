//! Crawl statistics for verbose output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Counters collected while crawling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    pub nodes_fetched: usize,
    /// Items popped from the frontier whose key was already visited.
    pub nodes_skipped: usize,
    pub sub_issues_crawled: usize,
    pub tasklist_refs_crawled: usize,
    pub timelines_checked: usize,
    pub cross_refs_found: usize,
    pub depth_reached: usize,
    pub repos_accessed: BTreeSet<String>,
    pub rate_limit_hits: usize,
    pub timed_out: bool,
}

impl CrawlStats {
    /// Renders the `CRAWL STATISTICS` block.
    pub fn format(&self, max_depth: usize) -> String {
        let mut out = String::new();
        out.push_str("CRAWL STATISTICS\n");
        out.push_str("================\n");
        let _ = writeln!(out, "Nodes fetched: {}", self.nodes_fetched);
        let _ = writeln!(out, "Nodes skipped (already visited): {}", self.nodes_skipped);
        let _ = writeln!(
            out,
            "Max depth reached: {} (limit: {})",
            self.depth_reached, max_depth
        );
        let _ = writeln!(out, "Sub-issues crawled: {}", self.sub_issues_crawled);
        let _ = writeln!(out, "Tasklist refs crawled: {}", self.tasklist_refs_crawled);
        let _ = writeln!(out, "Timelines checked: {}", self.timelines_checked);
        let _ = writeln!(out, "Cross-refs found: {}", self.cross_refs_found);
        let _ = writeln!(out, "Repos accessed: {}", self.repos_accessed.len());
        for repo in &self.repos_accessed {
            let _ = writeln!(out, "  - {}", repo);
        }
        if self.rate_limit_hits > 0 {
            let _ = writeln!(out, "⚠️  Rate limit backoffs: {}", self.rate_limit_hits);
        }
        if self.timed_out {
            out.push_str("⚠️  Crawl timed out - results may be incomplete\n");
        }
        out
    }
}
