//! Per-task retry loop
//!
//! Each attempt waits a politeness jitter, leases a session, picks a
//! proxy and runs one fetch-and-persist pass. Failures are logged to the
//! error table, charged to the proxy and followed by exponential backoff.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{FetchError, FetchExtractor};
use crate::crawler::pool::ResourcePool;
use crate::crawler::proxy::ProxyRotator;
use crate::crawler::scheduler::{CrawlScheduler, CrawlTask, TaskHandler, TaskOutcome};
use crate::crawler::session::Session;
use crate::storage::GraphStore;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Delays and attempt limits for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            min_delay: config.min_delay(),
            max_delay: config.max_delay(),
            max_retries: config.max_retries.max(1),
            backoff_base: config.backoff_base(),
        }
    }

    /// Uniformly random delay in `[min_delay, max_delay]`
    pub fn jitter_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    /// `backoff_base * 2^attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Runs crawl tasks with bounded retries
pub struct RetryController<S: Session> {
    pool: Arc<ResourcePool<S>>,
    proxies: Arc<ProxyRotator>,
    fetcher: FetchExtractor,
    store: Arc<dyn GraphStore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: Session> RetryController<S> {
    pub fn new(
        pool: Arc<ResourcePool<S>>,
        proxies: Arc<ProxyRotator>,
        fetcher: FetchExtractor,
        store: Arc<dyn GraphStore>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            proxies,
            fetcher,
            store,
            policy,
            cancel,
        }
    }

    /// Sleeps for `delay`, returning false if cancelled first
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// One fetch-and-persist pass; returns the number of newly queued links
    async fn attempt(
        &self,
        session: &mut S,
        url: &Url,
        proxy: Option<&str>,
        scheduler: &CrawlScheduler,
    ) -> Result<usize, FetchError> {
        let page = self.fetcher.fetch(session, url, proxy, &self.cancel).await?;

        self.store.upsert_page(url.as_str(), &page.content)?;

        let mut queued = 0;
        for link in &page.links {
            if scheduler.is_visited(link.as_str()) {
                continue;
            }
            self.store.upsert_link(url.as_str(), link.as_str())?;
            if scheduler.enqueue(link.as_str()) {
                queued += 1;
            }
        }

        Ok(queued)
    }

    fn record_error(&self, url: &str, message: &str, proxy: Option<&str>) {
        if let Err(e) = self.store.insert_error(url, message, proxy) {
            tracing::error!("Failed to record error for {}: {}", url, e);
        }
    }
}

#[async_trait]
impl<S: Session> TaskHandler for RetryController<S> {
    async fn handle(&self, mut task: CrawlTask, scheduler: Arc<CrawlScheduler>) -> TaskOutcome {
        let url = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                self.record_error(&task.url, &format!("Invalid URL: {}", e), None);
                return TaskOutcome::Failed;
            }
        };

        let max_retries = self.policy.max_retries;

        for attempt in 1..=max_retries {
            task.attempt = attempt;

            if !self.pause(self.policy.jitter_delay()).await {
                return TaskOutcome::Cancelled;
            }

            let mut lease = tokio::select! {
                lease = self.pool.acquire() => match lease {
                    Ok(lease) => lease,
                    Err(e) => {
                        tracing::warn!("Cannot process {}: {}", task.url, e);
                        return TaskOutcome::Cancelled;
                    }
                },
                _ = self.cancel.cancelled() => return TaskOutcome::Cancelled,
            };

            let proxy = self.proxies.select_proxy();
            let result = self
                .attempt(&mut lease, &url, proxy.as_deref(), &scheduler)
                .await;
            self.pool.release(lease).await;

            let error = match result {
                Ok(queued) => {
                    tracing::info!(
                        "Crawled {} (attempt {}, {} new links)",
                        task.url,
                        attempt,
                        queued
                    );
                    return TaskOutcome::Succeeded;
                }
                Err(FetchError::Cancelled) => return TaskOutcome::Cancelled,
                Err(error) => error,
            };

            let message = error.to_string();
            if attempt < max_retries {
                tracing::warn!(
                    "Attempt {}/{} for {} failed: {}",
                    attempt,
                    max_retries,
                    task.url,
                    message
                );
            } else {
                tracing::error!(
                    "Giving up on {} after {} attempts: {}",
                    task.url,
                    max_retries,
                    message
                );
            }

            self.record_error(&task.url, &message, proxy.as_deref());
            if let Some(proxy) = &proxy {
                self.proxies.report_failure(proxy);
            }

            if attempt < max_retries && !self.pause(self.policy.backoff_delay(attempt)).await {
                return TaskOutcome::Cancelled;
            }
        }

        TaskOutcome::Failed
    }

    fn task_aborted(&self, url: &str, message: &str) {
        self.record_error(url, &format!("Task panicked: {}", message), None);
    }
}
