//! Trellis CLI - Command-line interface for Trellis
//!
//! Builds the relationship graph around a GitHub issue or pull request,
//! serves the same tool over MCP, and shows the effective configuration.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trellis_core::IssueRef;

mod commands;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(author = "Trellis Contributors")]
#[command(version)]
#[command(about = "Relationship graphs for GitHub issues and pull requests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to <config dir>/trellis/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl and print the graph around an issue or pull request
    Graph {
        /// `owner/repo#123` or a github.com issue/pull URL
        target: IssueRef,

        /// Node to centre the graph on: provided, epic or batch
        #[arg(short, long, default_value = "provided")]
        focus: String,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,

        /// Append crawl statistics
        #[arg(long)]
        stats: bool,

        /// Maximum crawl depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Overall crawl deadline in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Only admit content from trusted authors
        #[arg(long)]
        lockdown: bool,
    },

    /// Start the MCP server on stdio
    Serve {
        /// Only admit content from trusted authors
        #[arg(long)]
        lockdown: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Graph {
            target,
            focus,
            json,
            stats,
            depth,
            timeout,
            lockdown,
        } => {
            let options = commands::GraphOptions {
                focus,
                json,
                stats,
                depth,
                timeout_ms: timeout,
                lockdown,
            };
            commands::graph(config_path, target, options).await
        }
        Commands::Serve { lockdown } => commands::serve(config_path, lockdown).await,
        Commands::Config => commands::show_config(config_path),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
