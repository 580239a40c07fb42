//! # feed-runner
//!
//! Entry point for the market trade feed.
//!
//! Connects to a Binance raw trade stream, decodes each trade, and hands it
//! to consumer threads through either the lock-free queue or the bounded ring
//! buffer.
//!
//! # Usage
//!
//! ```bash
//! feed-runner                                   # btcusdt@trade on data-stream.binance.vision
//! feed-runner ethusdt@trade stream.binance.com  # custom stream and endpoint
//! feed-runner --transport ring --capacity 16
//! feed-runner --config feed.json --log-level debug
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use feed_core::config::{AppConfig, TransportKind};
use feed_md::pipeline::TradePipeline;
use tracing::info;

/// Market Trade Feed Runner.
#[derive(Parser)]
#[command(name = "feed-runner", about = "Low-latency market trade feed")]
struct Cli {
    /// Stream to connect to (e.g. `btcusdt@trade`).
    stream: Option<String>,

    /// Endpoint host (e.g. `data-stream.binance.vision`).
    endpoint: Option<String>,

    /// Configuration file path (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport between ingestion and consumers: `queue` or `ring`.
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Ring buffer capacity (2–32).
    #[arg(long)]
    capacity: Option<usize>,

    /// Number of consumer threads (queue transport only).
    #[arg(long)]
    consumers: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

impl Cli {
    /// Load the config file (if any) and apply command-line overrides.
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => feed_core::config::load_config(path)?,
            None => AppConfig::default(),
        };

        if let Some(stream) = &self.stream {
            config.feed.streams = Some(vec![stream.clone()]);
        }
        if let Some(endpoint) = &self.endpoint {
            config.feed.endpoint = Some(endpoint.clone());
        }
        if let Some(kind) = self.transport {
            config.transport.kind = Some(kind);
        }
        if let Some(capacity) = self.capacity {
            config.transport.ring_capacity = Some(capacity);
        }
        if let Some(consumers) = self.consumers {
            config.transport.consumers = Some(consumers);
        }
        if let Some(dir) = &self.log_dir {
            config.module.log_path = Some(dir.clone());
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    // 1. Initialize logging
    feed_core::logging::init_logging(
        &cli.log_level,
        config.log_path().as_deref(),
        &config.module_name(),
    );

    info!("=== Binance Trade Stream Reader ===");
    info!("endpoint: {}", config.feed.effective_endpoint());
    info!("streams: {:?}", config.feed.effective_streams());
    info!("transport: {}", config.transport.effective_kind());

    // 2. Build and start the pipeline
    let mut pipeline = TradePipeline::new(config)?;
    pipeline.start()?;
    info!(
        "pipeline '{}' started, press Ctrl+C to stop",
        pipeline.name()
    );

    // 3. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 4. Stop gracefully
    let reports = pipeline.stop().await;
    let consumed: u64 = reports.iter().map(|r| r.consumed).sum();
    info!("all consumers stopped ({consumed} trade(s) consumed), goodbye");
    Ok(())
}
