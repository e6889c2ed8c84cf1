//! Porchlight stream-indexing daemon.
//!
//! This is the main entry point for the feed indexer. It consumes commit
//! events from a source, classifies posts into the two feed tables, and
//! checkpoints its stream position for crash-safe resumption.
//!
//! # Usage
//!
//! ```bash
//! # Replay a directory of JSONL event dumps
//! porchlight-ingest --input ./dumps
//!
//! # Custom database and mapping file locations
//! porchlight-ingest \
//!     --input ./dumps \
//!     --db-path /data/porchlight.db \
//!     --domains-path /etc/porchlight/domains.csv
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) for graceful shutdown:
//! 1. Stops the event source
//! 2. Drains events already in the channel
//! 3. Flushes a final cursor checkpoint
//! 4. Exits cleanly

use anyhow::{Context, Result};
use clap::Parser;
use porchlight_core::metrics::{init_metrics, start_metrics_server};
use porchlight_ingest::{
    DomainRegistry, HandleResolver, Indexer, IndexerConfig, IndexStore, JsonlConfig, JsonlSource,
    PlcDirectoryResolver, RegistryConfig,
};
use porchlight_ingest::resolver::DEFAULT_PLC_URL;
use porchlight_ingest::source::CommitSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Porchlight stream-indexing daemon.
#[derive(Parser, Debug)]
#[command(name = "porchlight-ingest")]
#[command(about = "Feed indexing daemon for firehose commit events")]
#[command(version)]
struct Args {
    /// Input JSONL file or directory to replay
    #[arg(long, short)]
    input: PathBuf,

    /// SQLite database path for the feed indexes
    #[arg(long, env = "PORCHLIGHT_DB_PATH", default_value = "./data/porchlight.db")]
    db_path: PathBuf,

    /// Handle→domain mapping file
    #[arg(long, env = "PORCHLIGHT_DOMAINS_PATH", default_value = "./data/domains.csv")]
    domains_path: PathBuf,

    /// Mapping file reload interval in seconds
    #[arg(long, default_value = "300")]
    reload_interval: u64,

    /// Logical stream id keying the persisted cursor
    #[arg(long, default_value = "firehose")]
    stream_id: String,

    /// Durable cursor write every N events
    #[arg(long, default_value = "20")]
    checkpoint_interval: u64,

    /// PLC directory endpoint for identity resolution
    #[arg(long, env = "PORCHLIGHT_PLC_URL", default_value = DEFAULT_PLC_URL)]
    plc_url: String,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("porchlight_ingest=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Porchlight indexing daemon starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle).await?;
        tracing::info!("Metrics server listening on port {}", args.metrics_port);
    }

    tracing::info!("Configuration:");
    tracing::info!("  Database: {}", args.db_path.display());
    tracing::info!("  Mappings: {}", args.domains_path.display());
    tracing::info!("  Input:    {}", args.input.display());
    tracing::info!("  Stream:   {}", args.stream_id);

    // Index store
    let store = Arc::new(
        IndexStore::open(&args.db_path)
            .with_context(|| format!("Failed to open index store at {:?}", args.db_path))?,
    );

    // Mapping registry with periodic reload
    let registry = Arc::new(DomainRegistry::new(RegistryConfig {
        path: args.domains_path.clone(),
        reload_interval: Duration::from_secs(args.reload_interval),
    }));
    let entries = registry.load();
    tracing::info!("Mapping registry loaded: {} handles", entries);
    registry.start_periodic_reload();

    // Identity resolver
    let resolver = HandleResolver::new(Arc::new(PlcDirectoryResolver::new(args.plc_url.clone())));

    // Indexer (loads the resume cursor)
    let mut indexer = Indexer::new(
        IndexerConfig {
            stream_id: args.stream_id.clone(),
            checkpoint_interval: args.checkpoint_interval,
            ..Default::default()
        },
        Arc::clone(&store),
        Arc::clone(&registry),
        resolver,
    )
    .context("Failed to initialize indexer")?;
    let resume_cursor = indexer.resume_cursor();

    // Event source feeding the indexer's channel
    let (tx, mut rx) = mpsc::channel(1024);
    let mut source = JsonlSource::new(JsonlConfig {
        input: args.input.clone(),
        ..Default::default()
    });
    tracing::info!("Starting source '{}'...", source.name());

    let source_task = tokio::spawn(async move { source.run(resume_cursor, tx).await });

    // Ctrl+C aborts the source; the channel then drains and the indexer
    // finishes with a final checkpoint
    let abort_handle = source_task.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping source...");
            abort_handle.abort();
        }
    });

    let index_stats = indexer
        .run(&mut rx)
        .await
        .context("Indexing pipeline failed")?;

    let source_stats = match source_task.await {
        Ok(result) => Some(result.context("Event source failed")?),
        Err(e) if e.is_cancelled() => None,
        Err(e) => return Err(e).context("Event source task panicked"),
    };

    registry.stop();

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Events processed:   {}", index_stats.events_processed);
    tracing::info!("Filtered indexed:   {}", index_stats.filtered_indexed);
    tracing::info!("Site indexed:       {}", index_stats.site_indexed);
    tracing::info!("Posts deleted:      {}", index_stats.deleted);
    tracing::info!("Resolver misses:    {}", index_stats.resolver_misses);
    if let Some(stats) = source_stats {
        tracing::info!("Source emitted:     {}", stats.events_emitted);
        tracing::info!("Source skipped:     {}", stats.events_skipped);
        tracing::info!("Decode errors:      {}", stats.decode_errors);
    }

    Ok(())
}
