//! Antenna main entry point
//!
//! This is the command-line interface for the Antenna transcript ingester.

use anyhow::{bail, Context};
use antenna::config::{load_config_with_hash, Config};
use antenna::discovery::{DescriptorFile, IdentityResolver, StaticResolver};
use antenna::output::{print_statistics, write_index, CollectionStatistics};
use antenna::pipeline::{Pipeline, RunOptions};
use antenna::registry::{list_collections, pending, RegistryStore};
use antenna::Stage;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Antenna: resumable transcript ingestion
///
/// Antenna keeps a per-collection registry of which items have been fetched,
/// rendered and summarized, and fetches missing transcripts through a chain
/// of scraping providers and direct access with retry and backoff.
#[derive(Parser, Debug)]
#[command(name = "antenna")]
#[command(version = "1.0.0")]
#[command(about = "Resumable transcript ingestion", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Collection id (or reference) to work on
    #[arg(short, long, required_unless_present = "stats")]
    collection: Option<String>,

    /// Display name stored in a new registry header
    #[arg(long)]
    display_name: Option<String>,

    /// Handle stored in a new registry header
    #[arg(long)]
    handle: Option<String>,

    /// Merge item descriptors from a JSON file before processing
    #[arg(long, value_name = "FILE")]
    discover: Option<PathBuf>,

    /// Only run the health probe and report
    #[arg(long, conflicts_with_all = ["pending", "stats", "index"])]
    probe: bool,

    /// List items pending a stage (fetch, render, summarize) and exit
    #[arg(long, value_name = "STAGE", conflicts_with_all = ["stats", "index"])]
    pending: Option<Stage>,

    /// Show statistics for one collection, or every collection under the root
    #[arg(long, conflicts_with = "index")]
    stats: bool,

    /// Rebuild the collection's index.json and exit
    #[arg(long)]
    index: bool,

    /// Stages to run (default: all)
    #[arg(long, value_delimiter = ',')]
    stages: Vec<Stage>,

    /// Fetch at most this many items
    #[arg(long)]
    limit: Option<usize>,

    /// Skip the health probe before fetching
    #[arg(long)]
    no_probe: bool,

    /// Continue even if the probe reports a block and the config says abort
    #[arg(long)]
    force: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats && cli.collection.is_none() {
        return handle_stats_all(&config);
    }

    let reference = cli
        .collection
        .as_deref()
        .context("--collection is required")?;
    let resolver = StaticResolver::new(cli.display_name.clone(), cli.handle.clone());
    let resolved = resolver.resolve(reference).await?;
    let collection_dir = resolved.locate(Path::new(&config.registry.root));

    if cli.stats {
        return handle_stats(&config, &collection_dir);
    }
    if let Some(stage) = cli.pending {
        return handle_pending(&config, &collection_dir, stage);
    }
    if cli.index {
        let registry = RegistryStore::from_config(&config.registry).load(&collection_dir)?;
        let path = write_index(&collection_dir, &registry)?;
        println!("✓ Index written to: {}", path.display());
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let pipeline = Pipeline::from_config(&config, &collection_dir)?.with_cancel(cancel);
    pipeline.init_collection(&resolved).await?;

    if let Some(file) = &cli.discover {
        let report = pipeline.discover(&DescriptorFile::new(file), &[]).await?;
        println!(
            "Discovered: {} new, {} refreshed, {} skipped",
            report.inserted, report.refreshed, report.skipped
        );
    }

    if cli.probe {
        return handle_probe(&pipeline, cli.force).await;
    }

    let options = RunOptions {
        stages: if cli.stages.is_empty() {
            Stage::all().to_vec()
        } else {
            cli.stages.clone()
        },
        limit: cli.limit,
        probe: !cli.no_probe,
        force: cli.force,
    };
    let summary = pipeline.run(&options).await?;

    println!("=== Run Summary ===\n");
    println!("  Fetched:            {}", summary.fetched);
    println!("  No transcript:      {}", summary.absent);
    println!("  Failed (retryable): {}", summary.exhausted);
    println!("  Rendered:           {}", summary.rendered);
    println!("  Render failures:    {}", summary.render_failed);
    println!("  Summarized:         {}", summary.summarized);
    if summary.cancelled {
        println!("\nRun was interrupted; rerun to resume.");
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("antenna=info,warn"),
            1 => EnvFilter::new("antenna=debug,info"),
            2 => EnvFilter::new("antenna=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels the run on the first Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing the current step");
            cancel.cancel();
        }
    });
}

/// Handles --probe: runs the health probe once and reports
async fn handle_probe(pipeline: &Pipeline, force: bool) -> anyhow::Result<()> {
    match pipeline.probe(force).await? {
        Some(report) if report.is_blocked => {
            println!("✗ Blocked: {}", report.detail);
        }
        Some(report) => {
            println!(
                "✓ Reachable via {}: {}",
                report.strategy.unwrap_or("no strategy"),
                report.detail
            );
        }
        None => bail!("the health probe is disabled in the configuration"),
    }
    Ok(())
}

/// Handles --pending: lists items that still need a stage
fn handle_pending(config: &Config, collection_dir: &Path, stage: Stage) -> anyhow::Result<()> {
    let registry = RegistryStore::from_config(&config.registry).load(collection_dir)?;
    let items = pending(&registry, stage);

    println!("Pending {} ({}):", stage, items.len());
    for item in items {
        println!(
            "  {}  {}  {}",
            item.published_at.format("%Y-%m-%d"),
            item.item_id,
            item.title
        );
    }
    Ok(())
}

/// Handles --stats for one collection
fn handle_stats(config: &Config, collection_dir: &Path) -> anyhow::Result<()> {
    let registry = RegistryStore::from_config(&config.registry).load(collection_dir)?;
    println!("Registry: {}\n", collection_dir.display());
    print_statistics(&CollectionStatistics::from_registry(&registry));
    Ok(())
}

/// Handles --stats without a collection: every registry under the root
fn handle_stats_all(config: &Config) -> anyhow::Result<()> {
    let root = Path::new(&config.registry.root);
    let store = RegistryStore::from_config(&config.registry);
    let collections = list_collections(root)
        .with_context(|| format!("failed to scan {}", root.display()))?;

    if collections.is_empty() {
        println!("No collections under {}", root.display());
        return Ok(());
    }

    for dir in collections {
        match store.load(&dir) {
            Ok(registry) => {
                print_statistics(&CollectionStatistics::from_registry(&registry));
                println!();
            }
            Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Skipping unreadable registry"),
        }
    }
    Ok(())
}
