//! Process-wide crawl status
//!
//! Lets an outer surface (CLI, HTTP layer) ask whether a crawl is running
//! and when the last one completed, and refuse overlapping runs.

use crate::storage::{GraphStore, StorageResult};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Shared running flag and last-completion timestamp
#[derive(Debug, Default)]
pub struct CrawlStatus {
    running: AtomicBool,
    last_completed: Mutex<Option<DateTime<Utc>>>,
}

impl CrawlStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a status seeded with the last completed run in `store`
    ///
    /// Keeps the last completion time stable across process restarts.
    pub fn from_store(store: &dyn GraphStore) -> StorageResult<Self> {
        let status = Self::new();
        if let Some(finished) = store.last_completed_run()?.and_then(|run| run.finished_at) {
            status.mark_completed(finished);
        }
        Ok(status)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_completed(&self) -> Option<DateTime<Utc>> {
        *self
            .last_completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the running flag
    ///
    /// # Returns
    ///
    /// * `Some(RunGuard)` - The flag is held until the guard drops
    /// * `None` - Another crawl is already running
    pub fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard { status: self })
    }

    pub fn mark_completed(&self, at: DateTime<Utc>) {
        *self
            .last_completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }
}

/// Clears the running flag on drop
#[derive(Debug)]
pub struct RunGuard<'a> {
    status: &'a CrawlStatus,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.status.running.store(false, Ordering::SeqCst);
    }
}
