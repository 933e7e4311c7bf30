//! Fixed-size session pool
//!
//! This module handles:
//! - Leasing idle sessions to crawl tasks
//! - Blocking handoff when every session is leased
//! - Resetting sessions on release
//! - Closing every session at shutdown

use crate::crawler::Session;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Errors returned by the resource pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Resource pool is closed")]
    Closed,

    #[error("Failed to close {failed} of {total} sessions")]
    Teardown { failed: usize, total: usize },
}

struct PooledSession<S> {
    session: S,
    last_used: Instant,
}

/// Pool of reusable sessions
///
/// Semaphore permits always equal the number of idle sessions, so a
/// successful permit acquisition guarantees an idle session to pop.
pub struct ResourcePool<S: Session> {
    idle: Mutex<Vec<PooledSession<S>>>,
    available: Semaphore,
    size: usize,
    closed: AtomicBool,
    leased: AtomicUsize,
    peak_leased: AtomicUsize,
    total_leases: AtomicU64,
    total_releases: AtomicU64,
}

impl<S: Session> ResourcePool<S> {
    /// Creates a pool owning `sessions`
    pub fn new(sessions: Vec<S>) -> Self {
        let size = sessions.len();
        let now = Instant::now();
        let idle = sessions
            .into_iter()
            .map(|session| PooledSession {
                session,
                last_used: now,
            })
            .collect();

        Self {
            idle: Mutex::new(idle),
            available: Semaphore::new(size),
            size,
            closed: AtomicBool::new(false),
            leased: AtomicUsize::new(0),
            peak_leased: AtomicUsize::new(0),
            total_leases: AtomicU64::new(0),
            total_releases: AtomicU64::new(0),
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<PooledSession<S>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases an idle session, waiting until one frees up
    ///
    /// # Returns
    ///
    /// * `Ok(SessionLease)` - Exclusive access to one session
    /// * `Err(PoolError::Closed)` - The pool has been shut down
    pub async fn acquire(self: &Arc<Self>) -> Result<SessionLease<S>, PoolError> {
        let permit = self
            .available
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;

        let pooled = self.lock_idle().pop().ok_or(PoolError::Closed)?;
        // Returned when the session goes back to idle
        permit.forget();

        let leased = self.leased.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_leased.fetch_max(leased, Ordering::SeqCst);
        self.total_leases.fetch_add(1, Ordering::SeqCst);

        tracing::trace!(
            "Leased session (idle for {:?}, {} of {} in use)",
            pooled.last_used.elapsed(),
            leased,
            self.size
        );

        Ok(SessionLease {
            session: Some(pooled.session),
            pool: Arc::clone(self),
        })
    }

    /// Resets a leased session and returns it to the idle pool
    ///
    /// A reset failure is logged; the session is returned either way.
    pub async fn release(&self, mut lease: SessionLease<S>) {
        let Some(mut session) = lease.session.take() else {
            return;
        };

        if let Err(e) = session.reset().await {
            tracing::warn!("Session reset failed, returning it to the pool anyway: {}", e);
        }

        if self.closed.load(Ordering::SeqCst) {
            if let Err(e) = session.close().await {
                tracing::warn!("Failed to close session released after shutdown: {}", e);
            }
            self.record_release();
            return;
        }

        self.return_session(session);
    }

    fn return_session(&self, session: S) {
        self.lock_idle().push(PooledSession {
            session,
            last_used: Instant::now(),
        });
        self.record_release();
        self.available.add_permits(1);
    }

    fn record_release(&self) {
        self.leased.fetch_sub(1, Ordering::SeqCst);
        self.total_releases.fetch_add(1, Ordering::SeqCst);
    }

    /// Closes the pool and every idle session
    ///
    /// All sessions are attempted even if some fail to close.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        self.closed.store(true, Ordering::SeqCst);
        self.available.close();

        let sessions = std::mem::take(&mut *self.lock_idle());
        let total = sessions.len();
        let mut failed = 0;

        for mut pooled in sessions {
            if let Err(e) = pooled.session.close().await {
                tracing::warn!("Failed to close session: {}", e);
                failed += 1;
            }
        }

        let outstanding = self.leased();
        if outstanding > 0 {
            tracing::warn!("Pool shut down with {} sessions still leased", outstanding);
        }

        tracing::info!("Resource pool shut down ({} sessions closed)", total - failed);

        if failed > 0 {
            return Err(PoolError::Teardown { failed, total });
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    pub fn leased(&self) -> usize {
        self.leased.load(Ordering::SeqCst)
    }

    pub fn peak_leased(&self) -> usize {
        self.peak_leased.load(Ordering::SeqCst)
    }

    pub fn total_leases(&self) -> u64 {
        self.total_leases.load(Ordering::SeqCst)
    }

    pub fn total_releases(&self) -> u64 {
        self.total_releases.load(Ordering::SeqCst)
    }
}

/// Exclusive access to one pooled session
///
/// Dropping a lease without [`ResourcePool::release`] still returns the
/// session, without resetting it. After shutdown the session is discarded.
pub struct SessionLease<S: Session> {
    session: Option<S>,
    pool: Arc<ResourcePool<S>>,
}

impl<S: Session> Deref for SessionLease<S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
            .as_ref()
            .expect("lease holds its session until released")
    }
}

impl<S: Session> DerefMut for SessionLease<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
            .as_mut()
            .expect("lease holds its session until released")
    }
}

impl<S: Session> Drop for SessionLease<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if self.pool.closed.load(Ordering::SeqCst) {
            tracing::warn!("Session lease dropped after pool shutdown; discarding it");
            self.pool.record_release();
            return;
        }

        tracing::warn!("Session lease dropped without release; returning it unreset");
        self.pool.return_session(session);
    }
}
