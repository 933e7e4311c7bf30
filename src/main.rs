//! Handbook crawler main entry point
//!
//! This is the command-line interface for the documentation-site crawler.

use clap::Parser;
use handbook_crawler::config::{compute_config_hash, load_config_with_hash, validate, Config};
use handbook_crawler::crawler::{run_crawl_with, CrawlStatus};
use handbook_crawler::output::{load_statistics, print_report, print_statistics};
use handbook_crawler::storage::{open_storage, GraphStore};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Handbook crawler: a polite documentation-site crawler
///
/// Crawls every page reachable from a seed URL on one origin, with a fixed
/// pool of sessions, rotating proxies and bounded retries, and stores the
/// page/link/error graph in SQLite.
#[derive(Parser, Debug)]
#[command(name = "handbook-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A polite documentation-site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl from this URL instead of the configured seed
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, mut config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(seed) = cli.seed {
        config.crawler.seed_url = seed;
        validate(&config)?;
        config_hash = compute_config_hash(&config)?;
    }
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("handbook_crawler=info,warn"),
            1 => EnvFilter::new("handbook_crawler=debug,info"),
            2 => EnvFilter::new("handbook_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;

    println!("=== Handbook Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed URL: {}", crawler.seed_url);
    println!("  Max concurrent: {}", crawler.max_concurrent);
    println!("  Delay window: {}-{}ms", crawler.min_delay, crawler.max_delay);
    println!("  Max retries: {}", crawler.max_retries);
    println!(
        "  Max queue size: {} (cooldown {}ms)",
        crawler.max_queue_size, crawler.queue_cooldown
    );
    println!("  Navigation timeout: {}ms", crawler.navigation_timeout);
    println!("  Backoff base: {}ms", crawler.backoff_base);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.resolved());

    println!("\nProxies ({}):", config.proxies.list.len());
    if config.proxies.list.is_empty() {
        println!("  (direct connection)");
    }
    for proxy in &config.proxies.list {
        println!("  - {}", proxy);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Crawling {} with {} sessions and {} proxies",
        config.crawler.seed_url,
        config.crawler.max_concurrent,
        config.proxies.list.len()
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing running tasks");
            on_interrupt.cancel();
        }
    });

    let status = {
        let store = open_storage(Path::new(&config.output.database_path))?;
        let status = CrawlStatus::from_store(&store)?;
        store.close()?;
        status
    };
    if let Some(at) = status.last_completed() {
        tracing::info!("Last completed crawl finished at {}", at.to_rfc3339());
    }

    match run_crawl_with(config, &status, cancel).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
