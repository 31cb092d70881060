//! Plain-text rendering of an [`IssueGraph`].
//!
//! The layout is line oriented so a language model can scan it: a summary,
//! one pipe-separated line per node, then the hierarchy and the
//! cross-references as arrow lists.

use crate::assembler::IssueGraph;
use crate::edge::Relation;
use std::collections::HashMap;
use std::fmt::Write;
use trellis_core::{truncate_with_ellipsis, GraphNode, IssueRef, NodeKey, NodeType};

const TASK_TEXT_MAX: usize = 80;

/// `#N` inside the focus repository, `owner/repo#N` elsewhere.
pub fn format_node_ref(reference: &IssueRef, focus: &IssueRef) -> String {
    reference.display_relative(&focus.owner, &focus.repo)
}

pub fn format_graph_output(graph: &IssueGraph) -> String {
    let mut out = String::new();

    out.push_str("GRAPH SUMMARY\n=============\n");
    out.push_str(&graph.summary);
    if !graph.focus_project.is_empty() {
        let projects: Vec<String> = graph
            .focus_project
            .iter()
            .map(|p| {
                if p.status.is_empty() {
                    p.project_title.clone()
                } else {
                    format!("{} [{}]", p.project_title, p.status)
                }
            })
            .collect();
        let _ = writeln!(out, "Projects: {}", projects.join(", "));
    }
    out.push('\n');

    out.push_str(
        "Node types: epic (large initiative), batch (has sub-issues), task (regular issue), pr (pull request)\n\n",
    );

    let _ = writeln!(out, "NODES ({} total)", graph.nodes.len());
    out.push_str("===============\n");
    for node in &graph.nodes {
        write_node(&mut out, node, &graph.focus);
    }

    out.push_str("\nSUB-ISSUES (parent → child)\n");
    out.push_str("===========================\n");
    let hierarchy: Vec<String> = graph
        .edges
        .iter()
        .filter_map(|edge| edge.as_parent_child())
        .map(|(parent, child)| {
            format!(
                "{} → {}",
                format_node_ref(parent, &graph.focus),
                format_node_ref(child, &graph.focus)
            )
        })
        .collect();
    write_list(&mut out, &hierarchy);

    out.push_str("\nCROSS-REFERENCES (mentioned/referenced)\n");
    out.push_str("=======================================\n");
    let by_key: HashMap<NodeKey, &GraphNode> =
        graph.nodes.iter().map(|node| (node.key(), node)).collect();
    let related: Vec<String> = graph
        .edges
        .iter()
        .filter(|edge| edge.relation == Relation::Related)
        .map(|edge| {
            let from = format_node_ref(&edge.from, &graph.focus);
            let to = format_node_ref(&edge.to, &graph.focus);
            match by_key.get(&edge.from.key()) {
                Some(node) if node.node_type == NodeType::Pr => {
                    format!("{} ({}) ↔ {}", from, pr_status(node), to)
                }
                _ => format!("{} ↔ {}", from, to),
            }
        })
        .collect();
    write_list(&mut out, &related);

    if let Some(stats) = &graph.crawl_summary {
        out.push('\n');
        out.push_str(stats);
    }

    out
}

fn write_node(out: &mut String, node: &GraphNode, focus: &IssueRef) {
    let _ = writeln!(
        out,
        "{}|{}|{}|{}{}",
        format_node_ref(&node.reference, focus),
        node.node_type,
        node.state_label(),
        node.title,
        if node.is_focus { " [FOCUS]" } else { "" }
    );
    if !node.body_preview.is_empty() {
        let _ = writeln!(out, "  Preview: {}", node.body_preview);
    }
    if !node.status_update.is_empty() {
        let _ = writeln!(out, "  Status: {}", node.status_update);
    }
    if node.tasklist_items.is_empty() {
        return;
    }

    let completed = node.tasklist_items.iter().filter(|t| t.completed).count();
    let _ = writeln!(
        out,
        "  Tasklist ({}/{} completed):",
        completed,
        node.tasklist_items.len()
    );
    for item in &node.tasklist_items {
        let check = if item.completed { "[x]" } else { "[ ]" };
        let text = truncate_with_ellipsis(&item.text, TASK_TEXT_MAX);
        match &item.linked_ref {
            Some(linked) => {
                let linked = IssueRef::from(linked);
                let _ = writeln!(
                    out,
                    "    {} {} → {}",
                    check,
                    text,
                    format_node_ref(&linked, focus)
                );
            }
            None => {
                let _ = writeln!(out, "    {} {}", check, text);
            }
        }
    }
}

fn write_list(out: &mut String, lines: &[String]) {
    if lines.is_empty() {
        out.push_str("(none)\n");
        return;
    }
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
}

/// Merged, closed or open, upper-cased.
fn pr_status(node: &GraphNode) -> String {
    if !node.state_reason.is_empty() && node.state_reason != node.state {
        node.state_reason.to_uppercase()
    } else {
        node.state.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::GraphEdge;
    use pretty_assertions::assert_eq;
    use trellis_core::{IssueReference, ProjectInfo, TasklistItem};

    fn node(number: u64, node_type: NodeType, title: &str) -> GraphNode {
        GraphNode {
            reference: IssueRef::new("owner", "repo", number),
            node_type,
            state: "open".into(),
            state_reason: String::new(),
            status_update: String::new(),
            title: title.into(),
            body_preview: String::new(),
            tasklist_items: Vec::new(),
            depth: 0,
            is_focus: false,
        }
    }

    fn graph(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> IssueGraph {
        IssueGraph {
            focus: IssueRef::new("owner", "repo", 42),
            nodes,
            edges,
            summary: "Focus: #42 (task) \"Test Issue\"\n".into(),
            focus_project: Vec::new(),
            crawl_summary: None,
        }
    }

    #[test]
    fn test_node_line_and_tasklist() {
        let mut focus = node(42, NodeType::Task, "Test Issue");
        focus.is_focus = true;
        focus.body_preview = "Short body".into();
        focus.tasklist_items = vec![
            TasklistItem {
                text: "Task one".into(),
                completed: true,
                linked_ref: None,
            },
            TasklistItem {
                text: "Task two".into(),
                completed: false,
                linked_ref: None,
            },
            TasklistItem {
                text: "Task three with #123".into(),
                completed: false,
                linked_ref: Some(IssueReference {
                    owner: "owner".into(),
                    repo: "repo".into(),
                    number: 123,
                    is_parent: false,
                }),
            },
        ];

        let out = format_graph_output(&graph(vec![focus], Vec::new()));
        assert!(out.contains("#42|task|open|Test Issue [FOCUS]\n"));
        assert!(out.contains("  Preview: Short body\n"));
        assert!(out.contains("  Tasklist (1/3 completed):\n"));
        assert!(out.contains("    [x] Task one\n"));
        assert!(out.contains("    [ ] Task three with #123 → #123\n"));
    }

    #[test]
    fn test_full_layout() {
        let mut focus = node(42, NodeType::Task, "Test Issue");
        focus.is_focus = true;
        let parent = node(1, NodeType::Epic, "Roadmap");
        let mut pr = node(7, NodeType::Pr, "Fix it");
        pr.state = "merged".into();
        pr.state_reason = "merged".into();
        let mut other = node(9, NodeType::Pr, "Closed attempt");
        other.reference = IssueRef::new("else", "where", 9);
        other.state = "closed".into();

        let edges = vec![
            GraphEdge::new(
                IssueRef::new("owner", "repo", 42),
                IssueRef::new("owner", "repo", 1),
                Relation::Parent,
            ),
            GraphEdge::new(
                IssueRef::new("owner", "repo", 7),
                IssueRef::new("owner", "repo", 42),
                Relation::Related,
            ),
            GraphEdge::new(
                IssueRef::new("else", "where", 9),
                IssueRef::new("owner", "repo", 42),
                Relation::Related,
            ),
        ];
        let mut g = graph(vec![parent, focus, pr, other], edges);
        g.focus_project = vec![
            ProjectInfo {
                project_title: "Roadmap Board".into(),
                status: "In Progress".into(),
            },
            ProjectInfo {
                project_title: "Triage".into(),
                status: String::new(),
            },
        ];

        let expected = "GRAPH SUMMARY\n\
=============\n\
Focus: #42 (task) \"Test Issue\"\n\
Projects: Roadmap Board [In Progress], Triage\n\
\n\
Node types: epic (large initiative), batch (has sub-issues), task (regular issue), pr (pull request)\n\
\n\
NODES (4 total)\n\
===============\n\
#1|epic|open|Roadmap\n\
#42|task|open|Test Issue [FOCUS]\n\
#7|pr|merged|Fix it\n\
else/where#9|pr|closed|Closed attempt\n\
\n\
SUB-ISSUES (parent → child)\n\
===========================\n\
#1 → #42\n\
\n\
CROSS-REFERENCES (mentioned/referenced)\n\
=======================================\n\
#7 (MERGED) ↔ #42\n\
else/where#9 (CLOSED) ↔ #42\n";
        assert_eq!(format_graph_output(&g), expected);
    }

    #[test]
    fn test_empty_sections() {
        let out = format_graph_output(&graph(Vec::new(), Vec::new()));
        assert!(out.contains("NODES (0 total)\n"));
        assert!(out.contains("===========================\n(none)\n"));
        assert!(out.contains("=======================================\n(none)\n"));
    }

    #[test]
    fn test_long_task_text_truncated() {
        let mut focus = node(42, NodeType::Batch, "Batch");
        focus.tasklist_items = vec![TasklistItem {
            text: "a".repeat(100),
            completed: false,
            linked_ref: None,
        }];
        let out = format_graph_output(&graph(vec![focus], Vec::new()));
        let expected = format!("    [ ] {}...\n", "a".repeat(77));
        assert!(out.contains(&expected));
    }

    #[test]
    fn test_crawl_summary_appended() {
        let mut g = graph(Vec::new(), Vec::new());
        g.crawl_summary = Some("CRAWL STATISTICS\n".into());
        assert!(format_graph_output(&g).ends_with("(none)\n\nCRAWL STATISTICS\n"));
    }

    #[test]
    fn test_format_node_ref() {
        let focus = IssueRef::new("Owner", "Repo", 1);
        assert_eq!(format_node_ref(&IssueRef::new("owner", "repo", 5), &focus), "#5");
        assert_eq!(
            format_node_ref(&IssueRef::new("other", "repo", 5), &focus),
            "other/repo#5"
        );
    }
}
