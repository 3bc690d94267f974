//! docqa-server: HTTP service for question answering over ingested
//! PDFs and web pages.

mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use docqa_core::config::load_config;
use docqa_core::embedding::{Embedder, GeminiEmbedder};
use docqa_core::engine::RagEngine;
use docqa_core::generation::{GeminiGenerator, Generator};
use docqa_core::index::VectorIndex;

/// Document question answering over PDFs and web pages
#[derive(Parser, Debug)]
#[command(name = "docqa-server", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./docqa.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    tracing_subscriber::registry().with(stderr_layer).init();

    let mut config = load_config(Some(Path::new(".")), cli.config.as_deref())?;

    for warning in config.validate() {
        tracing::warn!(warning = warning.as_str(), "Configuration warning");
    }

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let embedder = GeminiEmbedder::new(&config.embedding)
        .map_err(|e| anyhow::anyhow!("failed to initialize embedder: {}", e))?;
    let generator = GeminiGenerator::new(&config.generation)
        .map_err(|e| anyhow::anyhow!("failed to initialize generator: {}", e))?;

    tracing::info!(
        embedding_model = embedder.model_name(),
        generation_model = generator.model_name(),
        index_path = %config.index.path.display(),
        "Starting docqa"
    );

    let index = VectorIndex::open(&config.index.path).map_err(|e| {
        anyhow::anyhow!(
            "failed to open vector index at {}: {}",
            config.index.path.display(),
            e
        )
    })?;

    let engine = Arc::new(RagEngine::new(
        Arc::new(embedder),
        Arc::new(generator),
        index,
        config.chunking.clone(),
        config.retrieval.clone(),
    )?);

    let stats = engine.stats().await?;
    tracing::info!(
        entries = stats.entry_count,
        sources = stats.source_count,
        "Vector index ready"
    );

    server::run(engine, &config.server.host, config.server.port).await?;
    Ok(())
}
