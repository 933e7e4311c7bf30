//! Scheduler for managing the crawl queue and rate limiting
//!
//! This module handles:
//! - Visited-set admission (the only deduplication point)
//! - FIFO dispatch bounded by a concurrency limit
//! - A minimum interval between consecutive dispatches
//! - Pausing dispatch when the pending queue grows past its ceiling
//! - Containing task failures and panics at the task boundary

use crate::config::CrawlerConfig;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// URLs ever accepted for crawling
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `url` visited, returning false if it already was
    pub fn insert(&self, url: &str) -> bool {
        self.lock().insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// One URL to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: String,
    /// Last attempt started, 0 while queued
    pub attempt: u32,
}

/// How a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Work executed for every dispatched task
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: CrawlTask, scheduler: Arc<CrawlScheduler>) -> TaskOutcome;

    /// Called when `handle` panicked for `url`
    fn task_aborted(&self, url: &str, message: &str);
}

/// Scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub enqueued: u64,
    pub skipped_duplicates: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    /// Tasks cancelled while running plus pending tasks dropped on cancel
    pub cancelled: u64,
    pub pauses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    skipped_duplicates: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    pauses: AtomicU64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<CrawlTask>,
    active: usize,
    paused_until: Option<Instant>,
    last_dispatch: Option<Instant>,
    closed: bool,
}

enum Step {
    Dispatch(CrawlTask),
    Sleep(Instant),
    Wait,
    Stop,
}

/// Crawl queue and dispatcher
pub struct CrawlScheduler {
    visited: Arc<VisitedSet>,
    state: Mutex<QueueState>,
    /// Wakes the dispatcher on enqueue, task completion and close
    wake: Notify,
    /// Wakes `wait_idle` callers on task completion
    idle: Notify,
    max_concurrent: usize,
    min_interval: Duration,
    max_queue_size: usize,
    cooldown: Duration,
    cancel: CancellationToken,
    counters: Counters,
}

impl CrawlScheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Supplies concurrency, interval and backpressure settings
    /// * `visited` - Visited set shared with the rest of the crawl
    /// * `cancel` - Stops dispatch and drops pending tasks when cancelled
    pub fn new(config: &CrawlerConfig, visited: Arc<VisitedSet>, cancel: CancellationToken) -> Self {
        Self {
            visited,
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            idle: Notify::new(),
            max_concurrent: config.max_concurrent.max(1) as usize,
            min_interval: config.min_delay(),
            max_queue_size: config.max_queue_size,
            cooldown: config.queue_cooldown(),
            cancel,
            counters: Counters::default(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits `url` unless it has been seen before
    ///
    /// The visited set is updated before this returns, so a URL can never
    /// be queued twice no matter how many tasks discover it concurrently.
    pub fn enqueue(&self, url: &str) -> bool {
        if !self.visited.insert(url) {
            self.counters.skipped_duplicates.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        {
            let mut state = self.lock_state();
            state.pending.push_back(CrawlTask {
                url: url.to_string(),
                attempt: 0,
            });

            if state.pending.len() > self.max_queue_size && state.paused_until.is_none() {
                state.paused_until = Some(Instant::now() + self.cooldown);
                self.counters.pauses.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "Queue size {} exceeds {}, pausing dispatch for {:?}",
                    state.pending.len(),
                    self.max_queue_size,
                    self.cooldown
                );
            }
        }

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.wake.notify_one();
        true
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn pending(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn active(&self) -> usize {
        self.lock_state().active
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.counters;
        SchedulerStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            skipped_duplicates: c.skipped_duplicates.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            pauses: c.pauses.load(Ordering::Relaxed),
        }
    }

    /// Starts the dispatch loop
    pub fn start<H: TaskHandler>(self: &Arc<Self>, handler: Arc<H>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.dispatch_loop(handler).await })
    }

    /// Stops dispatching; running tasks are left to finish
    pub fn close(&self) {
        self.lock_state().closed = true;
        self.wake.notify_one();
    }

    /// Resolves once nothing is pending and no task is running
    ///
    /// After cancellation, resolves once running tasks have finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock_state();
                if state.active == 0 && (state.pending.is_empty() || self.cancel.is_cancelled()) {
                    return;
                }
            }

            if self.cancel.is_cancelled() {
                notified.await;
            } else {
                tokio::select! {
                    _ = &mut notified => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }
    }

    async fn dispatch_loop<H: TaskHandler>(self: Arc<Self>, handler: Arc<H>) {
        tracing::debug!("Dispatcher started");

        loop {
            if self.cancel.is_cancelled() {
                self.drop_pending();
                break;
            }

            match self.next_step() {
                Step::Dispatch(task) => self.spawn_task(task, &handler),
                Step::Sleep(until) => {
                    tokio::select! {
                        _ = sleep_until(until) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                Step::Wait => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                Step::Stop => break,
            }
        }

        self.idle.notify_waiters();
        tracing::debug!("Dispatcher stopped");
    }

    fn next_step(&self) -> Step {
        let mut state = self.lock_state();
        let now = Instant::now();

        if state.closed {
            return Step::Stop;
        }

        if let Some(until) = state.paused_until {
            if now < until {
                return Step::Sleep(until);
            }
            state.paused_until = None;
            tracing::info!("Resuming dispatch with {} pending tasks", state.pending.len());
        }

        if state.pending.is_empty() || state.active >= self.max_concurrent {
            return Step::Wait;
        }

        if let Some(last) = state.last_dispatch {
            let ready_at = last + self.min_interval;
            if now < ready_at {
                return Step::Sleep(ready_at);
            }
        }

        let Some(task) = state.pending.pop_front() else {
            return Step::Wait;
        };
        state.active += 1;
        state.last_dispatch = Some(now);

        tracing::debug!(
            "Working on {} ({} pending, {} active)",
            task.url,
            state.pending.len(),
            state.active
        );

        Step::Dispatch(task)
    }

    fn spawn_task<H: TaskHandler>(self: &Arc<Self>, task: CrawlTask, handler: &Arc<H>) {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let scheduler = Arc::clone(self);
        let handler = Arc::clone(handler);

        tokio::spawn(async move {
            let url = task.url.clone();

            // Run the handler in its own task so a panic surfaces as a JoinError
            let inner = tokio::spawn({
                let handler = Arc::clone(&handler);
                let scheduler = Arc::clone(&scheduler);
                async move { handler.handle(task, scheduler).await }
            });

            let outcome = match inner.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = join_error_message(e);
                    tracing::error!("Task for {} aborted: {}", url, message);
                    handler.task_aborted(&url, &message);
                    TaskOutcome::Failed
                }
            };

            scheduler.finish_task(outcome);
        });
    }

    fn finish_task(&self, outcome: TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Succeeded => &self.counters.completed,
            TaskOutcome::Failed => &self.counters.failed,
            TaskOutcome::Cancelled => &self.counters.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.lock_state().active -= 1;
        self.wake.notify_one();
        self.idle.notify_waiters();
    }

    fn drop_pending(&self) {
        let dropped = {
            let mut state = self.lock_state();
            let dropped = state.pending.len();
            state.pending.clear();
            dropped
        };

        if dropped > 0 {
            tracing::info!("Crawl cancelled, dropping {} pending tasks", dropped);
            self.counters
                .cancelled
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }
}

fn join_error_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
