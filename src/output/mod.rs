//! Output module for crawl reports
//!
//! This module handles:
//! - The report returned by a finished crawl run
//! - Printing that report for the CLI
//! - Reading statistics back from an existing database

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::crawler::SchedulerStats;
use std::time::Duration;

/// Counts for one crawl run
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub run_id: i64,
    pub seed_url: String,
    /// Rows in the pages table after the run
    pub pages: u64,
    pub links: u64,
    pub errors: u64,
    pub scheduler: SchedulerStats,
    pub elapsed: Duration,
    /// The run was stopped through its cancellation token
    pub cancelled: bool,
}

impl CrawlReport {
    /// Pages stored per second of wall-clock time
    pub fn pages_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.pages as f64 / secs
        } else {
            0.0
        }
    }
}

/// Prints a crawl report to stdout in a formatted manner
pub fn print_report(report: &CrawlReport) {
    let outcome = if report.cancelled {
        "interrupted"
    } else {
        "completed"
    };

    println!("=== Crawl Report ===\n");
    println!("Run {} {} ({})", report.run_id, outcome, report.seed_url);
    println!(
        "  Duration: {:.1}s ({:.2} pages/sec)",
        report.elapsed.as_secs_f64(),
        report.pages_per_second()
    );
    println!();

    println!("Graph:");
    println!("  Pages: {}", report.pages);
    println!("  Links: {}", report.links);
    println!("  Errors: {}", report.errors);
    println!();

    let s = &report.scheduler;
    println!("Scheduler:");
    println!("  Enqueued: {}", s.enqueued);
    println!("  Duplicates skipped: {}", s.skipped_duplicates);
    println!("  Dispatched: {}", s.dispatched);
    println!("  Succeeded: {}", s.completed);
    println!("  Failed: {}", s.failed);
    if s.cancelled > 0 {
        println!("  Cancelled: {}", s.cancelled);
    }
    if s.pauses > 0 {
        println!("  Backpressure pauses: {}", s.pauses);
    }
}
