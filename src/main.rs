// ABOUTME: CLI entry point for beatsaver-cache
// ABOUTME: Parses commands, loads settings and runs backfill and live sync

use anyhow::Context;
use beatsaver_cache::backfill::{seed, Backfill, BackfillStats};
use beatsaver_cache::catalog::{Catalog, CatalogClient};
use beatsaver_cache::config::Settings;
use beatsaver_cache::live::{Channel, LiveSync, WebSocketConnector};
use beatsaver_cache::snapshot::{self, SnapshotWriter};
use beatsaver_cache::store::MirrorStore;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "beatsaver-cache")]
#[command(about = "Local protobuf mirror of the BeatSaver map catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to a config.toml (defaults to the user config directory)
    #[arg(long, env = "BEATSAVER_CACHE_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Override the snapshot output path
    #[arg(long = "cache-path", global = true)]
    cache_path: Option<PathBuf>,
    /// Override the number of maps requested per backfill page
    #[arg(long = "page-size", global = true)]
    page_size: Option<u32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill the whole catalog, then follow live events until Ctrl+C
    Run,
    /// Backfill the whole catalog, write one snapshot and exit
    Backfill,
    /// Print a summary of an existing snapshot file
    Inspect {
        /// Snapshot file to read
        path: PathBuf,
        /// Number of map ids to list
        #[arg(long, default_value_t = 5)]
        sample: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // We need to parse CLI args early to get the log level
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Inspect { path, sample } => inspect(path, sample).await,
        Commands::Backfill => {
            let settings = load_settings(cli.config, cli.cache_path, cli.page_size)?;
            let catalog = build_catalog(&settings)?;
            backfill(&settings, catalog.as_ref()).await
        }
        Commands::Run => {
            let settings = load_settings(cli.config, cli.cache_path, cli.page_size)?;
            run(settings).await
        }
    }
}

fn load_settings(
    config: Option<PathBuf>,
    cache_path: Option<PathBuf>,
    page_size: Option<u32>,
) -> anyhow::Result<Settings> {
    let mut settings =
        Settings::load_or_default(config.as_deref()).context("Failed to load settings")?;
    if let Some(path) = cache_path {
        settings.cache_path = path;
    }
    if let Some(size) = page_size {
        settings.page_size = size;
    }
    settings.validate()?;
    Ok(settings)
}

fn build_catalog(settings: &Settings) -> anyhow::Result<Arc<CatalogClient>> {
    let client = CatalogClient::new(&settings.api_base_url, settings.http_timeout())?;
    Ok(Arc::new(client))
}

/// Backfills once and fails if the snapshot cannot be written.
async fn backfill(settings: &Settings, catalog: &dyn Catalog) -> anyhow::Result<()> {
    let mut store = MirrorStore::new();
    let stats = Backfill::new(catalog, settings.backfill_config())
        .run(&mut store)
        .await;

    let writer = SnapshotWriter::new(&settings.cache_path);
    let bytes = writer
        .flush(&store)
        .await
        .context("Failed to write snapshot after backfill")?;

    print_summary(&store, &stats);
    println!("  Snapshot: {} ({} bytes)", writer.path().display(), bytes);
    println!();

    Ok(())
}

fn print_summary(store: &MirrorStore, stats: &BackfillStats) {
    println!();
    println!("========================================");
    println!("Backfill complete");
    println!("========================================");
    println!("  Maps cached: {}", store.len());
    println!("  Rejected: {}", stats.rejected);
    println!("  Invalid: {}", stats.invalid);
    println!("  Pages: {} ({} retries)", stats.pages, stats.retries);
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let catalog = build_catalog(&settings)?;
    let writer = SnapshotWriter::new(&settings.cache_path);
    // a failed first write is logged; live updates rewrite the snapshot
    let (store, stats) = seed(catalog.as_ref(), settings.backfill_config(), &writer).await;
    print_summary(&store, &stats);
    println!();

    let mut sync = LiveSync::new(
        store,
        catalog,
        writer,
        settings.watchdog_config(),
    )
    .with_connector(
        Channel::Maps,
        Arc::new(WebSocketConnector::new(settings.map_stream_url.clone())),
    );
    if let Some(url) = &settings.vote_stream_url {
        sync = sync.with_connector(Channel::Votes, Arc::new(WebSocketConnector::new(url.clone())));
    } else {
        tracing::info!("No vote_stream_url configured, vote channel disabled");
    }

    tracing::info!("Following live events, press Ctrl+C to stop");

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    let store = sync.run(shutdown_rx).await?;
    tracing::info!("Live sync stopped with {} maps mirrored", store.len());
    Ok(())
}

async fn inspect(path: PathBuf, sample: usize) -> anyhow::Result<()> {
    let list = snapshot::load(&path).await?;

    println!("Snapshot: {}", path.display());
    println!("  Schema version: {}", list.schema_version);
    println!("  Maps: {}", list.map_metadata.len());
    for (id, meta) in list.map_metadata.iter().take(sample) {
        println!(
            "  {} {} ({} up / {} down, {} difficulties)",
            id,
            meta.song_name.as_deref().unwrap_or("<untitled>"),
            meta.votes.as_ref().map(|v| v.up).unwrap_or(0),
            meta.votes.as_ref().map(|v| v.down).unwrap_or(0),
            meta.difficulties.len()
        );
    }
    Ok(())
}
