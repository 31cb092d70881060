//! Crawl and client configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Bounds and tuning knobs for a single crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Items deeper than this are never fetched.
    pub max_depth: usize,
    /// Worker count and cap on concurrent fetches.
    pub max_concurrent_fetches: usize,
    /// Base backoff; attempt `n` sleeps `base * 2^n`.
    pub rate_limit_backoff_ms: u64,
    /// Retries after the first rate-limited attempt.
    pub max_rate_limit_retries: u32,
    pub crawl_timeout_ms: u64,
    pub parent_query_timeout_ms: u64,
    pub project_query_timeout_ms: u64,
    pub sub_issue_page_size: u32,
    pub timeline_page_size: u32,
    pub comment_page_size: u32,
    /// Upper bound on pages followed per listing.
    pub max_list_pages: u32,
    /// Consult the access filter before admitting a node.
    pub lockdown_mode: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_concurrent_fetches: 5,
            rate_limit_backoff_ms: 100,
            max_rate_limit_retries: 3,
            crawl_timeout_ms: 10_000,
            parent_query_timeout_ms: 2_000,
            project_query_timeout_ms: 3_000,
            sub_issue_page_size: 50,
            timeline_page_size: 100,
            comment_page_size: 3,
            max_list_pages: 3,
            lockdown_mode: false,
        }
    }
}

impl CrawlConfig {
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    /// Backoff before retry `attempt` (0-based). Saturates at `Duration::MAX`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.rate_limit_backoff()
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(Duration::MAX)
    }

    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_millis(self.crawl_timeout_ms)
    }

    pub fn parent_query_timeout(&self) -> Duration {
        Duration::from_millis(self.parent_query_timeout_ms)
    }

    pub fn project_query_timeout(&self) -> Duration {
        Duration::from_millis(self.project_query_timeout_ms)
    }
}

/// Connection settings for the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub graphql_url: String,
    /// Bearer token. Never written back out.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            token: None,
            user_agent: format!("trellis/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GitHubConfig {
    /// Applies `GITHUB_TOKEN`/`GH_TOKEN` and the `TRELLIS_*` URL overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("GITHUB_TOKEN").or_else(|| non_empty("GH_TOKEN")) {
            self.token = Some(token);
        }
        if let Some(url) = non_empty("TRELLIS_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = non_empty("TRELLIS_GRAPHQL_URL") {
            self.graphql_url = url;
        }
    }
}

/// On-disk configuration: `{ "crawl": {...}, "github": {...} }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub crawl: CrawlConfig,
    pub github: GitHubConfig,
}

impl TrellisConfig {
    /// Loads a config file. Missing sections and fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: shown.clone(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: shown.clone(),
            source,
        })?;
        debug!("Loaded config from {}", shown);
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
