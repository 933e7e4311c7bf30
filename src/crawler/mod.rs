//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Pooled, resettable page-loading sessions
//! - Egress proxy rotation
//! - Request scheduling, rate limiting and backpressure
//! - Content and link extraction
//! - Per-URL retry handling
//! - Overall crawl coordination

mod coordinator;
mod extractor;
mod fetcher;
mod pool;
mod proxy;
mod retry;
mod scheduler;
mod session;
mod status;

pub use coordinator::{run_crawl, run_crawl_with, CrawlOrchestrator};
pub use extractor::{parse_page, ExtractedPage};
pub use fetcher::{FetchError, FetchExtractor, FetchedPage};
pub use pool::{PoolError, ResourcePool, SessionLease};
pub use proxy::{ProxyRotator, ProxyState};
pub use retry::{RetryController, RetryPolicy};
pub use scheduler::{
    CrawlScheduler, CrawlTask, SchedulerStats, TaskHandler, TaskOutcome, VisitedSet,
};
pub use session::{
    build_http_client, HttpSession, LoadedPage, NavigateOptions, ResourceKind, Session,
    BLOCKED_RESOURCES,
};
pub use status::{CrawlStatus, RunGuard};
