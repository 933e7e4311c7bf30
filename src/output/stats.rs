//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{GraphStore, RunRecord, StorageResult};

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub total_pages: u64,
    pub total_links: u64,
    pub total_errors: u64,

    /// Most recent run that completed, if any
    pub last_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Average outgoing edges per stored page
    pub fn links_per_page(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.total_links as f64 / self.total_pages as f64
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The graph store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn GraphStore) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        total_pages: store.count_pages()?,
        total_links: store.count_links()?,
        total_errors: store.count_errors()?,
        last_run: store.last_completed_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages stored: {}", stats.total_pages);
    println!(
        "  Links stored: {} ({:.1} per page)",
        stats.total_links,
        stats.links_per_page()
    );
    println!("  Error records: {}", stats.total_errors);
    println!();

    match &stats.last_run {
        Some(run) => {
            println!("Last completed run:");
            println!("  Run ID: {}", run.id);
            println!("  Seed: {}", run.seed_url);
            println!("  Started: {}", run.started_at.to_rfc3339());
            if let Some(finished) = run.finished_at {
                println!("  Finished: {}", finished.to_rfc3339());
                let duration = finished - run.started_at;
                println!("  Duration: {}s", duration.num_seconds());
            }
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("No completed runs recorded."),
    }
}
