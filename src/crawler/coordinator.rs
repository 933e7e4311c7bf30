//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires the crawl components together for one run:
//! - Opening the graph store and recording the run
//! - Building the session pool, proxy rotator and scheduler
//! - Seeding the queue and waiting for it to drain
//! - Tearing down the pool and store on every exit path

use crate::config::{compute_config_hash, validate, Config};
use crate::crawler::fetcher::FetchExtractor;
use crate::crawler::pool::ResourcePool;
use crate::crawler::proxy::ProxyRotator;
use crate::crawler::retry::{RetryController, RetryPolicy};
use crate::crawler::scheduler::{CrawlScheduler, VisitedSet};
use crate::crawler::session::{HttpSession, Session};
use crate::crawler::status::CrawlStatus;
use crate::output::CrawlReport;
use crate::storage::{open_storage, GraphStore, RunStatus};
use crate::url::normalize_url;
use crate::{ConfigError, CrawlError, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Owns every component of one crawl run
pub struct CrawlOrchestrator<S: Session> {
    config: Config,
    config_hash: String,
    store: Arc<dyn GraphStore>,
    pool: Arc<ResourcePool<S>>,
    proxies: Arc<ProxyRotator>,
    visited: Arc<VisitedSet>,
    cancel: CancellationToken,
}

impl CrawlOrchestrator<HttpSession> {
    /// Creates an orchestrator with `max-concurrent` HTTP sessions
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `cancel` - Token that aborts the run when cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOrchestrator)` - Successfully initialized
    /// * `Err(CrawlError)` - Invalid config or unusable database
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        let sessions = (0..config.crawler.max_concurrent)
            .map(|_| HttpSession::new())
            .collect();
        Self::with_sessions(config, sessions, cancel)
    }
}

impl<S: Session> CrawlOrchestrator<S> {
    /// Creates an orchestrator over caller-supplied sessions
    pub fn with_sessions(config: Config, sessions: Vec<S>, cancel: CancellationToken) -> Result<Self> {
        validate(&config)?;
        if sessions.is_empty() {
            return Err(ConfigError::Validation("at least one session is required".to_string()).into());
        }

        let config_hash = compute_config_hash(&config)?;
        let store = open_storage(Path::new(&config.output.database_path))?;
        let proxies = ProxyRotator::from_config(&config);

        tracing::info!(
            "Initialized crawler: {} sessions, {} proxies, database {}",
            sessions.len(),
            proxies.len(),
            config.output.database_path
        );

        Ok(Self {
            config,
            config_hash,
            store: Arc::new(store),
            pool: Arc::new(ResourcePool::new(sessions)),
            proxies: Arc::new(proxies),
            visited: Arc::new(VisitedSet::new()),
            cancel,
        })
    }

    /// Crawls everything reachable from `seed_url`
    ///
    /// Teardown (closing the pool, then the store) runs whether or not the
    /// crawl itself succeeded.
    pub async fn run(self, seed_url: &str) -> Result<CrawlReport> {
        let started = Instant::now();
        let result = self.crawl(seed_url, started).await;
        let teardown = self.teardown().await;

        let report = result?;
        teardown?;
        Ok(report)
    }

    async fn crawl(&self, seed_url: &str, started: Instant) -> Result<CrawlReport> {
        let seed = normalize_url(seed_url)?;
        let run_id = self.store.create_run(seed.as_str(), &self.config_hash)?;
        tracing::info!("Starting crawl run {} from {}", run_id, seed);

        let scheduler = Arc::new(CrawlScheduler::new(
            &self.config.crawler,
            Arc::clone(&self.visited),
            self.cancel.clone(),
        ));
        let controller = Arc::new(RetryController::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.proxies),
            FetchExtractor::from_config(&self.config),
            Arc::clone(&self.store),
            RetryPolicy::from_config(&self.config.crawler),
            self.cancel.clone(),
        ));

        let dispatcher = scheduler.start(controller);
        scheduler.enqueue(seed.as_str());
        scheduler.wait_idle().await;
        scheduler.close();

        if let Err(e) = dispatcher.await {
            tracing::error!("Dispatcher task failed: {}", e);
        }

        let cancelled = self.cancel.is_cancelled();
        let status = if cancelled {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };

        let counts = self.count_rows();
        let finished = self.store.finish_run(
            run_id,
            if counts.is_ok() { status } else { RunStatus::Failed },
        );
        let (pages, links, errors) = counts?;
        finished?;

        let report = CrawlReport {
            run_id,
            seed_url: seed.to_string(),
            pages,
            links,
            errors,
            scheduler: scheduler.stats(),
            elapsed: started.elapsed(),
            cancelled,
        };

        tracing::info!(
            "Crawl run {} {}: {} pages, {} links, {} errors in {:.1}s",
            run_id,
            status.to_db_string(),
            pages,
            links,
            errors,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

    fn count_rows(&self) -> Result<(u64, u64, u64)> {
        Ok((
            self.store.count_pages()?,
            self.store.count_links()?,
            self.store.count_errors()?,
        ))
    }

    async fn teardown(&self) -> Result<()> {
        let pool = self.pool.shutdown().await;
        let store = self.store.close();

        pool?;
        store?;
        Ok(())
    }
}

/// Runs a complete crawl with a fresh status and token
///
/// # Example
///
/// ```no_run
/// use handbook_crawler::config::load_config;
/// use handbook_crawler::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("crawler.toml"))?;
/// let report = run_crawl(config).await?;
/// println!("{} pages", report.pages);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<CrawlReport> {
    run_crawl_with(config, &CrawlStatus::new(), CancellationToken::new()).await
}

/// Runs a complete crawl from the configured seed URL
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `status` - Shared status; a run already holding it is a conflict
/// * `cancel` - Token that aborts the run when cancelled
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Counts for the finished (or cancelled) run
/// * `Err(CrawlError::AlreadyRunning)` - Another crawl holds `status`
/// * `Err(CrawlError)` - Startup or teardown failed
pub async fn run_crawl_with(
    config: Config,
    status: &CrawlStatus,
    cancel: CancellationToken,
) -> Result<CrawlReport> {
    let _guard = status.try_begin().ok_or(CrawlError::AlreadyRunning)?;

    let seed_url = config.crawler.seed_url.clone();
    let report = CrawlOrchestrator::new(config, cancel)?.run(&seed_url).await?;

    if !report.cancelled {
        status.mark_completed(Utc::now());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::session::fake::FakeSite;
    use crate::storage::SqliteGraphStore;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir, seed: &str) -> Config {
        let mut config = Config::default();
        config.crawler.seed_url = seed.to_string();
        config.crawler.max_concurrent = 2;
        config.crawler.min_delay = 10;
        config.crawler.max_delay = 20;
        config.crawler.backoff_base = 10;
        config.crawler.queue_cooldown = 50;
        config.crawler.navigation_timeout = 5000;
        config.output.database_path = dir.path().join("crawl.db").to_string_lossy().to_string();
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_links_and_anchors_do_not_duplicate_work() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, "https://docs.example.com/a");
        let db_path = config.output.database_path.clone();

        let site = FakeSite::new();
        site.page(
            "https://docs.example.com/a",
            r##"<html><head><title>A</title></head><body><main>
                <p>Page A</p>
                <a href="/a">A</a><a href="/b">B</a><a href="/a#section">Section</a>
            </main></body></html>"##,
        );
        site.page(
            "https://docs.example.com/b",
            r#"<html><head><title>B</title></head><body><main><p>Page B</p><a href="/a">Back</a></main></body></html>"#,
        );

        let orchestrator =
            CrawlOrchestrator::with_sessions(config, site.sessions(2), CancellationToken::new())
                .unwrap();
        let report = orchestrator.run("https://docs.example.com/a").await.unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.links, 1);
        assert_eq!(report.errors, 0);
        assert!(!report.cancelled);
        assert_eq!(site.navigations_to("https://docs.example.com/a"), 1);
        assert_eq!(site.navigations_to("https://docs.example.com/b"), 1);
        assert_eq!(site.closes.load(Ordering::SeqCst), 2);

        let store = SqliteGraphStore::open(Path::new(&db_path)).unwrap();
        let links = store.outgoing_links("https://docs.example.com/a").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].to, "https://docs.example.com/b");

        let run = store.last_completed_run().unwrap().unwrap();
        assert_eq!(run.id, report.run_id);
        assert_eq!(run.seed_url, "https://docs.example.com/a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_is_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, "https://docs.example.com/");
        let db_path = config.output.database_path.clone();

        let site = FakeSite::new();
        site.script(
            "https://docs.example.com/",
            vec![crate::crawler::session::fake::FakeResponse::Hang],
        );

        let cancel = CancellationToken::new();
        let orchestrator =
            CrawlOrchestrator::with_sessions(config, site.sessions(1), cancel.clone()).unwrap();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            cancel.cancel();
        });

        let report = orchestrator.run("https://docs.example.com/").await.unwrap();
        canceller.await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.pages, 0);
        assert_eq!(report.errors, 0);

        let store = SqliteGraphStore::open(Path::new(&db_path)).unwrap();
        assert!(store.last_completed_run().unwrap().is_none());
    }

    #[test]
    fn test_missing_database_is_rejected() {
        let mut config = Config::default();
        config.output.database_path = String::new();

        let result = CrawlOrchestrator::new(config, CancellationToken::new());
        assert!(matches!(
            result,
            Err(CrawlError::Config(ConfigError::MissingDatabase))
        ));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_refused() {
        let status = CrawlStatus::new();
        let _held = status.try_begin().unwrap();

        let result = run_crawl_with(Config::default(), &status, CancellationToken::new()).await;
        assert!(matches!(result, Err(CrawlError::AlreadyRunning)));
        assert!(status.is_running());
    }
}
