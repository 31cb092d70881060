//! Text shaping for node previews and status lines.

use crate::source::Milestone;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s<>\[\]]+").expect("valid regex"));

static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|\W)(status|on[- ]?track|delayed|at[- ]?risk|blocked|behind|ahead|eta|target|due|deadline)[:\s]+([^\n]{3,80})",
    )
    .expect("valid regex")
});

const MAX_STATUS_MATCHES: usize = 3;
const MAX_STATUS_PARTS: usize = 2;
const MAX_STATUS_VALUE_LEN: usize = 60;

/// Truncates to `max` characters, replacing the tail with `...`.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Produces a one-line preview of an issue body.
///
/// Images become `[image]`, URLs become `[link]`, HTML tags are dropped,
/// whitespace is collapsed per line and blank lines are skipped. At most
/// `max_lines` lines are kept, each cut to `max_line_len`, joined by ` | `.
pub fn sanitize_body(body: &str, max_lines: usize, max_line_len: usize) -> String {
    if body.is_empty() || max_lines == 0 {
        return String::new();
    }

    let body = IMAGE.replace_all(body, "[image]");
    let body = URL.replace_all(&body, "[link]");
    let body = HTML_TAG.replace_all(&body, "");

    let mut lines = Vec::with_capacity(max_lines);
    for line in body.split('\n') {
        let line = WHITESPACE.replace_all(line, " ");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        lines.push(truncate_with_ellipsis(line, max_line_len));
        if lines.len() >= max_lines {
            break;
        }
    }

    lines.join(" | ")
}

/// Preview line allowance: the focus gets the most context.
pub fn body_lines_for_depth(depth: usize) -> usize {
    match depth {
        0 => 8,
        1 => 5,
        2 => 4,
        _ => 3,
    }
}

pub fn max_line_len_for_depth(depth: usize) -> usize {
    match depth {
        0 => 120,
        1 => 100,
        2 => 80,
        _ => 60,
    }
}

/// Extracts a short status line from a milestone and a body.
pub fn extract_status_update(body: &str, milestone: Option<&Milestone>) -> String {
    extract_status_update_at(body, milestone, Utc::now())
}

/// Same as [`extract_status_update`] with an explicit clock.
pub fn extract_status_update_at(
    body: &str,
    milestone: Option<&Milestone>,
    now: DateTime<Utc>,
) -> String {
    let mut parts = Vec::new();

    if let Some(milestone) = milestone {
        if let Some(due) = milestone.due_on {
            parts.push(milestone_status(&milestone.title, due, now));
        }
    }

    for caps in STATUS.captures_iter(body).take(MAX_STATUS_MATCHES) {
        let keyword = caps[1].to_lowercase();
        let value = truncate_with_ellipsis(caps[2].trim(), MAX_STATUS_VALUE_LEN);
        if let Some(label) = status_label(&keyword) {
            parts.push(format!("{}: {}", label, value));
        }
    }

    parts.truncate(MAX_STATUS_PARTS);
    parts.join("; ")
}

fn milestone_status(title: &str, due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let name = if title.is_empty() {
        String::new()
    } else {
        format!(" '{}'", title)
    };
    if due < now {
        format!("Milestone{} overdue by {} days", name, (now - due).num_days())
    } else {
        format!("Milestone{} due in {} days", name, (due - now).num_days())
    }
}

fn status_label(keyword: &str) -> Option<&'static str> {
    if keyword == "status" {
        Some("Status")
    } else if keyword.contains("track") {
        Some("On-track")
    } else if keyword.contains("delay") || keyword.contains("behind") {
        Some("Delayed")
    } else if keyword.contains("risk") {
        Some("At-risk")
    } else if keyword.contains("block") {
        Some("Blocked")
    } else if ["eta", "target", "due", "deadline"]
        .iter()
        .any(|k| keyword.contains(k))
    {
        Some("Target")
    } else {
        // "ahead" is matched but not reported
        None
    }
}

/// Merges the status found in recent comments with the body status.
///
/// `comment_bodies` must be ordered newest first; the first comment that
/// yields a status wins.
pub fn merge_comment_status<'a, I>(body_status: &str, comment_bodies: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    for comment in comment_bodies {
        let comment_status = extract_status_update(comment, None);
        if comment_status.is_empty() {
            continue;
        }
        if body_status.is_empty() {
            return comment_status;
        }
        if comment_status != body_status {
            return format!("{} | {}", comment_status, body_status);
        }
        return body_status.to_string();
    }
    body_status.to_string()
}
