//! Understory CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "understory")]
#[command(about = "Proactive code context: dependency graph plus working memory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Configuration file (defaults to understory.toml in the root)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the cache bound in bytes
    #[arg(long)]
    max_cache_bytes: Option<usize>,

    /// Override the per-file extraction timeout
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Override the maximum syntax tree depth
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a file and print it with its injected context
    Read {
        /// File to read, relative to the root or absolute
        path: PathBuf,
    },
    /// Index the project and print statistics
    Index,
    /// Index the project and print the relationship graph
    Graph,
    /// Watch the project and answer reads for paths given on stdin
    Watch,
}

const CRATES: &[&str] = &[
    "understory",
    "understory_core",
    "understory_indexer",
    "understory_memory",
    "understory_watcher",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON.
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={log_level}")).collect();
        tracing_subscriber::EnvFilter::new(directives.join(","))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Understory v{}", env!("CARGO_PKG_VERSION"));

    let overrides = understory_core::ConfigOptions {
        max_cache_bytes: cli.max_cache_bytes,
        extraction_timeout_ms: cli.timeout_ms,
        max_traversal_depth: cli.max_depth,
        ..Default::default()
    };
    let config = commands::load_config(&cli.root, cli.config.as_deref(), &overrides)?;
    tracing::info!("Project root: {}", config.project_root.display());

    match cli.command {
        Commands::Read { path } => commands::read(config, path),
        Commands::Index => commands::index(config),
        Commands::Graph => commands::graph(config),
        Commands::Watch => commands::watch(config).await,
    }
}
