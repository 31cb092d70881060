//! End-to-end: crawl, refocus, assemble and render.

mod common;

use common::{issue, pull_request, r, sources, test_config, MockGitHub};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trellis_core::{CrawlConfig, IssueRef, NodeType, ProjectInfo};
use trellis_graph::{
    build_issue_graph, format_graph_output, CrawlError, FocusSource, FocusTarget, GraphCrawler,
    IssueGraph, IssueGraphRequest,
};

async fn run(mock: &Arc<MockGitHub>, request: &IssueGraphRequest) -> IssueGraph {
    build_issue_graph(sources(mock), test_config(), request, &CancellationToken::new())
        .await
        .expect("graph")
}

fn hierarchy_mock() -> MockGitHub {
    // 100 (epic) ⊃ 10 (batch) ⊃ {1, 2}; PR 50 closes 1
    MockGitHub::new()
        .with(issue(100, "Platform epic", "Quarter goals"))
        .with(issue(10, "Login batch", "Status: on track for May"))
        .with(issue(1, "Add OAuth button", "Part of the login work"))
        .with(issue(2, "Session storage", ""))
        .with(pull_request(50, "OAuth button", "Closes #1"))
        .with_parent(r(1), r(10))
        .with_parent(r(2), r(10))
        .with_parent(r(10), r(100))
        .with_sub_issues(r(10), &[r(1), r(2)])
        .with_sub_issues(r(100), &[r(10)])
        .with_cross_reference(r(1), r(50))
}

#[tokio::test]
async fn test_provided_focus_graph() {
    let mock = Arc::new(hierarchy_mock());
    let request = IssueGraphRequest::new(r(1));

    let graph = run(&mock, &request).await;

    assert_eq!(graph.focus, r(1));
    let numbers: Vec<u64> = graph.nodes.iter().map(|n| n.reference.number).collect();
    assert!(numbers.contains(&10));
    assert!(numbers.contains(&100));
    assert!(numbers.contains(&50));
    assert!(!numbers.contains(&2), "siblings of the focus stay out");
    assert!(graph.crawl_summary.is_none());

    assert!(graph.summary.starts_with("Focus: #1 (task) \"Add OAuth button\"\n"));
    assert!(graph
        .summary
        .contains("Hierarchy: #100 (epic) → #10 (batch) → #1 (task)\n"));

    let out = format_graph_output(&graph);
    assert!(out.contains("#1|task|open|Add OAuth button [FOCUS]\n"));
    assert!(out.contains("#10 → #1\n"));
    assert!(out.contains("#100 → #10\n"));
    assert!(out.contains("#50 (OPEN) ↔ #1\n"));
}

#[tokio::test]
async fn test_epic_focus_moves_up_the_hierarchy() {
    let mock = Arc::new(hierarchy_mock());
    let request = IssueGraphRequest::new(r(1))
        .with_focus(FocusTarget::Epic)
        .verbose(true);

    let graph = run(&mock, &request).await;

    assert_eq!(graph.focus, r(100));
    let focused: Vec<u64> = graph
        .nodes
        .iter()
        .filter(|n| n.is_focus)
        .map(|n| n.reference.number)
        .collect();
    assert_eq!(focused, vec![100]);
    assert!(graph
        .summary
        .contains("Focus shifted: from #1 via sub-issue/closes hierarchy\n"));
    assert!(graph.crawl_summary.is_some());
    assert!(format_graph_output(&graph).contains("CRAWL STATISTICS\n"));
}

#[tokio::test]
async fn test_epic_request_falls_back_to_batch() {
    let mock = Arc::new(
        MockGitHub::new()
            .with(issue(10, "Login batch", ""))
            .with(issue(1, "Add OAuth button", ""))
            .with_parent(r(1), r(10))
            .with_sub_issues(r(10), &[r(1)]),
    );
    let crawler = GraphCrawler::new(sources(&mock), test_config(), r(1));
    crawler
        .crawl(&CancellationToken::new())
        .await
        .expect("crawl");

    let choice = crawler.apply_focus(FocusTarget::Epic).await;

    assert_eq!(choice.target, r(10));
    assert_eq!(choice.source, FocusSource::Hierarchy);
    assert_eq!(crawler.focus().await, r(10));
}

#[tokio::test]
async fn test_missing_type_suggestions() {
    let mock = Arc::new(MockGitHub::new().with(issue(1, "Lonely task", "")));
    let request = IssueGraphRequest::new(r(1)).with_focus(FocusTarget::Batch);

    let graph = run(&mock, &request).await;

    assert_eq!(graph.focus, r(1));
    assert!(graph
        .summary
        .contains("No batch found: searched hierarchy and cross-references from #1\n"));
    assert!(graph.summary.contains("  1. Provide a link:"));
}

#[tokio::test]
async fn test_project_info_attached() {
    let mock = Arc::new(
        MockGitHub::new()
            .with(issue(1, "Tracked", ""))
            .with_projects(
                r(1),
                vec![ProjectInfo {
                    project_title: "Roadmap".to_string(),
                    status: "In Progress".to_string(),
                }],
            ),
    );
    let request = IssueGraphRequest::new(r(1));

    let graph = run(&mock, &request).await;

    assert_eq!(graph.focus_project.len(), 1);
    assert!(format_graph_output(&graph).contains("Projects: Roadmap [In Progress]\n"));
}

#[tokio::test]
async fn test_deadline_returns_partial_graph() {
    let mock = Arc::new(
        MockGitHub::new()
            .with(issue(1, "Root", ""))
            .with(issue(2, "Quick", ""))
            .with_sub_issues(r(1), &[r(2), r(3)])
            .with_hanging(r(3)),
    );
    let config = CrawlConfig {
        crawl_timeout_ms: 150,
        ..test_config()
    };
    let request = IssueGraphRequest::new(r(1)).verbose(true);

    let graph = build_issue_graph(sources(&mock), config, &request, &CancellationToken::new())
        .await
        .expect("deadline keeps the partial graph");

    assert!(!graph.nodes.is_empty());
    assert!(graph
        .crawl_summary
        .expect("verbose")
        .contains("Crawl timed out"));
}

#[tokio::test]
async fn test_cancelled_request_fails() {
    let mock = Arc::new(MockGitHub::new().with(issue(1, "Root", "")).with_hanging(r(1)));
    let cancel = CancellationToken::new();
    let request = IssueGraphRequest::new(r(1));

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        })
    };
    let outcome = build_issue_graph(sources(&mock), test_config(), &request, &cancel).await;
    let _ = canceller.await;

    assert_eq!(outcome.err(), Some(CrawlError::Cancelled));
}

#[tokio::test]
async fn test_unreachable_focus() {
    let mock = Arc::new(MockGitHub::new());
    let request = IssueGraphRequest::new(IssueRef::new("ghost", "town", 1));

    let graph = run(&mock, &request).await;

    assert!(graph.nodes.is_empty());
    assert_eq!(
        graph.summary,
        "Unable to fetch the requested issue or pull request."
    );
}

#[tokio::test]
async fn test_batch_status_from_comments() {
    let mock = Arc::new(
        MockGitHub::new()
            .with(issue(10, "Login batch", ""))
            .with(issue(1, "Child", ""))
            .with_sub_issues(r(10), &[r(1)])
            .with_comments(r(10), &["Status: blocked on review", "Older chatter"]),
    );
    let request = IssueGraphRequest::new(r(10));

    let graph = run(&mock, &request).await;

    let batch = graph.focus_node().expect("focus");
    assert_eq!(batch.node_type, NodeType::Batch);
    assert!(!batch.status_update.is_empty());
    assert!(batch.status_update.to_lowercase().contains("blocked"));
}

#[tokio::test]
async fn test_sub_issue_also_in_tasklist_counted_once() {
    let mock = Arc::new(
        MockGitHub::new()
            .with(issue(1, "Platform epic", "- [ ] Build #2"))
            .with(issue(2, "Build it", ""))
            .with_sub_issues(r(1), &[r(2)]),
    );
    let request = IssueGraphRequest::new(r(1));

    let graph = run(&mock, &request).await;

    assert!(graph.summary.contains("Direct children: 1\n"));
    let out = format_graph_output(&graph);
    assert_eq!(out.matches("#1 → #2\n").count(), 1);
}
