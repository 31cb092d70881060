//! CLI command implementations.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_core::{CrawlConfig, GitHubConfig, IssueRef, TrellisConfig};
use trellis_github::GitHubClient;
use trellis_graph::{
    build_issue_graph, format_graph_output, FocusTarget, IssueGraphRequest, Sources,
};
use trellis_mcp::McpServer;

/// Flags of `trellis graph` that tune a single crawl.
#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    pub focus: String,
    pub json: bool,
    pub stats: bool,
    pub depth: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub lockdown: bool,
}

/// `<config dir>/trellis/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("trellis").join("config.json"))
}

/// Reads the config file without environment overrides.
///
/// An explicit path must exist; the default location may be absent.
fn read_config(explicit: Option<&Path>) -> Result<TrellisConfig> {
    if let Some(path) = explicit {
        return TrellisConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }
    match default_config_path() {
        Some(path) => {
            debug!("Looking for config at {}", path.display());
            Ok(TrellisConfig::load_or_default(&path)?)
        }
        None => Ok(TrellisConfig::default()),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<TrellisConfig> {
    let mut config = read_config(explicit)?;
    config.github.apply_env();
    Ok(config)
}

fn apply_graph_options(crawl: &mut CrawlConfig, options: &GraphOptions) {
    if let Some(depth) = options.depth {
        crawl.max_depth = depth;
    }
    if let Some(timeout) = options.timeout_ms {
        crawl.crawl_timeout_ms = timeout;
    }
    if options.lockdown {
        crawl.lockdown_mode = true;
    }
}

fn github_sources(config: GitHubConfig) -> Result<Sources> {
    let client = Arc::new(GitHubClient::new(config).context("Failed to create GitHub client")?);
    Ok(Sources::new(client.clone())
        .with_hierarchy(client.clone())
        .with_access_filter(client))
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            token.cancel();
        }
    })
}

/// Crawl around `target` and print the graph.
pub async fn graph(
    config_path: Option<&Path>,
    target: IssueRef,
    options: GraphOptions,
) -> Result<()> {
    let focus: FocusTarget = options.focus.parse()?;
    let mut config = load_config(config_path)?;
    apply_graph_options(&mut config.crawl, &options);
    if config.github.token.is_none() {
        eprintln!(
            "{} No GITHUB_TOKEN set; anonymous requests are heavily rate limited",
            "⚠".yellow()
        );
    }

    let sources = github_sources(config.github)?;
    let request = IssueGraphRequest::new(target.clone())
        .with_focus(focus)
        .verbose(options.stats);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(format!("Crawling {}...", target));

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_ctrl_c(cancel.clone());
    let started = Instant::now();
    let outcome = build_issue_graph(sources, config.crawl, &request, &cancel).await;
    interrupt.abort();
    spinner.finish_and_clear();

    let graph = outcome.with_context(|| format!("Failed to build graph for {}", target))?;
    eprintln!(
        "{} {} nodes, {} edges in {}ms",
        "✓".green(),
        graph.nodes.len().to_string().cyan(),
        graph.edges.len().to_string().cyan(),
        started.elapsed().as_millis()
    );

    if options.json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    } else {
        print!("{}", format_graph_output(&graph));
    }

    Ok(())
}

/// Run the MCP server on stdio until stdin closes or Ctrl-C.
pub async fn serve(config_path: Option<&Path>, lockdown: bool) -> Result<()> {
    let mut config = load_config(config_path)?;
    if lockdown {
        config.crawl.lockdown_mode = true;
    }

    let sources = github_sources(config.github)?;
    let server = McpServer::new(sources, config.crawl);
    let shutdown = server.shutdown_token();

    tokio::select! {
        result = server.run_stdio() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down MCP server");
            shutdown.cancel();
            Ok(())
        }
    }
}

/// Print the merged file, default and environment configuration.
pub fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let source = match config_path {
        Some(path) => path.display().to_string(),
        None => default_config_path()
            .filter(|path| path.exists())
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string()),
    };
    eprintln!("{} {}", "Config:".cyan(), source);
    let token = if config.github.token.is_some() { "set".green() } else { "not set".yellow() };
    eprintln!("{} {}", "GitHub token:".cyan(), token);

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_path_layout() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("trellis/config.json"));
        }
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = read_config(Some(&missing)).unwrap_err();
        assert!(format!("{:#}", err).contains("nope.json"));
    }

    #[test]
    fn test_explicit_config_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"crawl": {{"max_depth": 2}}}}"#).unwrap();

        let config = read_config(Some(file.path())).unwrap();
        assert_eq!(config.crawl.max_depth, 2);
        assert_eq!(config.github, GitHubConfig::default());
    }

    #[test]
    fn test_graph_options_override_crawl_config() {
        let mut crawl = CrawlConfig::default();
        let options = GraphOptions {
            depth: Some(2),
            timeout_ms: Some(2500),
            lockdown: true,
            ..GraphOptions::default()
        };

        apply_graph_options(&mut crawl, &options);

        assert_eq!(crawl.max_depth, 2);
        assert_eq!(crawl.crawl_timeout_ms, 2500);
        assert!(crawl.lockdown_mode);
        assert_eq!(crawl.max_concurrent_fetches, CrawlConfig::default().max_concurrent_fetches);
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let mut crawl = CrawlConfig {
            lockdown_mode: true,
            max_depth: 7,
            ..CrawlConfig::default()
        };
        apply_graph_options(&mut crawl, &GraphOptions::default());
        assert!(crawl.lockdown_mode);
        assert_eq!(crawl.max_depth, 7);
    }

    #[test]
    fn test_target_forms() {
        let short: IssueRef = "octo/app#12".parse().unwrap();
        let url: IssueRef = "https://github.com/octo/app/pull/12".parse().unwrap();
        assert_eq!(short, url);
        assert!("octo/app".parse::<IssueRef>().is_err());
    }

    #[tokio::test]
    async fn test_unknown_focus_rejected_before_crawl() {
        let options = GraphOptions {
            focus: "milestone".to_string(),
            ..GraphOptions::default()
        };
        let err = graph(None, IssueRef::new("octo", "app", 1), options)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown focus 'milestone'"));
    }
}
