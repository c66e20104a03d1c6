//! svip-migrate CLI
//!
//! Splits the closure collection into per-year closure and checkin
//! collections. Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use svip_migrate::retry::{with_retry, RetryConfig};
use svip_migrate::store::DocumentStore;
use svip_migrate::{MigrationConfig, MongoStore, Pipeline};

#[derive(Parser)]
#[command(name = "svip-migrate")]
#[command(version)]
#[command(
    about = "Move closures and their checkins into per-year collections",
    long_about = None
)]
struct Cli {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// MongoDB connection string
    #[arg(long, env = "MONGODB_URI")]
    uri: Option<String>,

    /// Database holding the source and destination collections
    #[arg(long, env = "SVIP_DATABASE")]
    database: Option<String>,

    /// Source collection
    #[arg(long)]
    collection: Option<String>,

    /// Maximum closures migrated concurrently
    #[arg(long, env = "SVIP_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Per-insert timeout in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    insert_timeout: Option<u64>,

    /// Dry run mode (don't write to destination)
    #[arg(long)]
    dry_run: bool,

    /// Abort if the initial count fails
    #[arg(long)]
    strict_count: bool,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<MigrationConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                MigrationConfig::from_file(path)?
            }
            None => MigrationConfig::default(),
        };

        if let Some(uri) = &self.uri {
            config.source.uri = uri.clone();
        }
        if let Some(database) = &self.database {
            config.source.database = database.clone();
        }
        if let Some(collection) = &self.collection {
            config.source.collection = collection.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.options.concurrency = concurrency;
        }
        if let Some(secs) = self.insert_timeout {
            config.options.insert_timeout_secs = secs;
        }
        if self.dry_run {
            config.options.dry_run = true;
        }
        if self.strict_count {
            config.options.strict_count = true;
        }
        if let Some(report) = &self.report {
            config.options.report_path = Some(report.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = cli.load_config()?;
    run_migration(config).await
}

async fn run_migration(config: MigrationConfig) -> anyhow::Result<()> {
    let retry = RetryConfig::for_setup(config.options.setup_retries);

    let store = with_retry(&retry, "connect", || MongoStore::connect(&config.source))
        .await
        .inspect_err(|e| error!(error = %e, "Could not create MongoDB client"))?;
    with_retry(&retry, "ping", || store.ping())
        .await
        .inspect_err(|e| error!(error = %e, "MongoDB health check failed"))?;
    info!("Connected to MongoDB");

    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let pipeline = Pipeline::new(Arc::clone(&store), &config);

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight closures");
            cancel.cancel();
        }
    });

    let result = pipeline.run().await;
    drop(pipeline);
    if let Err(e) = store.close().await {
        warn!(error = %e, "Failed to close MongoDB client");
    }
    let report = result?;

    if let Some(path) = &config.options.report_path {
        report.write_json(path)?;
        info!("Report written to {:?}", path);
    }

    println!("\nMigration {}", if report.cancelled { "cancelled" } else { "complete" });
    println!("   Pulled:     {}", report.pulled);
    println!("   Skipped:    {}", report.skipped);
    println!(
        "   Checkins:   {} migrated, {} failed",
        report.checkins_migrated, report.checkins_failed
    );
    println!(
        "   Closures:   {} migrated, {} failed",
        report.closures_migrated, report.closures_failed
    );
    println!("   Duration:   {:.2}s", report.duration_secs);
    println!("   Throughput: {:.0} closures/sec", report.throughput());

    Ok(())
}
