use codegraph_rag::chunk::ChunkId;
use codegraph_rag::config::{ChunkingStrategy, Config};
use codegraph_rag::db::Db;
use codegraph_rag::discovery;
use codegraph_rag::graph::expander::Direction;
use codegraph_rag::manager::IndexManager;
use codegraph_rag::mcp::server::{McpContext, McpServer};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Codebase indexing and cross-reference context expansion.
#[derive(Parser)]
#[command(name = "codegraph-rag", version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP tools over stdio.
    Serve,

    /// Index a directory and persist the new generation.
    Ingest {
        /// Codebase root (default: discovery.root from config).
        dir: Option<PathBuf>,

        /// Override the configured chunking strategy.
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Expand seed chunk ids against the persisted generation.
    Expand {
        #[arg(required = true)]
        seeds: Vec<String>,

        #[arg(long)]
        max_chunks: Option<usize>,

        #[arg(long)]
        max_hops: Option<usize>,

        #[arg(long, value_enum, default_value = "outgoing")]
        direction: DirectionArg,
    },

    /// Show the persisted generation.
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Structured,
    Line,
    Auto,
}

impl From<StrategyArg> for ChunkingStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Structured => ChunkingStrategy::Structured,
            StrategyArg::Line => ChunkingStrategy::Line,
            StrategyArg::Auto => ChunkingStrategy::Auto,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Outgoing,
    Incoming,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Outgoing => Direction::Outgoing,
            DirectionArg::Incoming => Direction::Incoming,
            DirectionArg::Both => Direction::Both,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the config file's log_level.
    let level = peek_log_level(&cli.config);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    let db = Db::open(&config.db_path).context("Failed to open database")?;
    let db = Arc::new(TokioMutex::new(db));
    let manager = IndexManager::new()
        .context("Failed to initialize extractors")?
        .with_store(db);
    manager
        .restore()
        .await
        .context("Failed to restore persisted generation")?;
    let manager = Arc::new(manager);

    match cli.command {
        Commands::Serve => cmd_serve(manager, config).await,
        Commands::Ingest { dir, strategy } => cmd_ingest(&manager, config, dir, strategy).await,
        Commands::Expand {
            seeds,
            max_chunks,
            max_hops,
            direction,
        } => cmd_expand(&manager, &config, seeds, max_chunks, max_hops, direction),
        Commands::Status => cmd_status(&manager).await,
    }
}

fn peek_log_level(config_path: &str) -> String {
    std::fs::read_to_string(config_path)
        .ok()
        .and_then(|data| serde_json::from_str::<serde_json::Value>(&data).ok())
        .and_then(|v| v.get("log_level")?.as_str().map(str::to_string))
        .unwrap_or_else(|| "info".to_string())
}

async fn cmd_serve(manager: Arc<IndexManager>, config: Config) -> Result<()> {
    let ctx = McpContext {
        manager,
        config: Arc::new(config),
    };
    McpServer::new(ctx).start().await
}

async fn cmd_ingest(
    manager: &IndexManager,
    config: Config,
    dir: Option<PathBuf>,
    strategy: Option<StrategyArg>,
) -> Result<()> {
    let root = dir.unwrap_or_else(|| PathBuf::from(&config.discovery.root));
    let mut ingest = config.ingest.clone();
    if let Some(strategy) = strategy {
        ingest.chunking_strategy = strategy.into();
    }

    let discovery_config = config.discovery.clone();
    let walk_root = root.clone();
    let files =
        tokio::task::spawn_blocking(move || discovery::discover(&walk_root, &discovery_config))
            .await
            .context("discovery task failed")??;
    info!(root = %root.display(), files = files.len(), "Ingesting");

    let report = manager.ingest(files, ingest).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_expand(
    manager: &IndexManager,
    config: &Config,
    seeds: Vec<String>,
    max_chunks: Option<usize>,
    max_hops: Option<usize>,
    direction: DirectionArg,
) -> Result<()> {
    let seeds: Vec<ChunkId> = seeds.into_iter().map(ChunkId::from).collect();
    let bundle = manager.expand_with(
        &seeds,
        max_chunks.unwrap_or(config.expand.max_chunks),
        max_hops.unwrap_or(config.expand.max_hops),
        direction.into(),
    )?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

async fn cmd_status(manager: &IndexManager) -> Result<()> {
    let generation = manager.current();
    let persisted = manager.persisted().await?;
    let status = serde_json::json!({
        "status": manager.status(),
        "generation_id": generation.as_ref().map(|g| g.id),
        "created_at": generation.as_ref().map(|g| g.created_at.to_rfc3339()),
        "stats": generation.as_ref().map(|g| g.stats()),
        "persisted": persisted,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
