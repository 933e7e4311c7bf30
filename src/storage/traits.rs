//! Storage traits and error types
//!
//! This module defines the trait interface for the crawl-graph store and
//! associated error types.

use crate::content::PageContent;
use crate::storage::{ErrorRecord, LinkEdge, PageRecord, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Store connection is closed")]
    Closed,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence interface for the page/link/error graph
///
/// Implementations are shared between concurrent crawl tasks, so every
/// method takes `&self`. Idempotency must come from the store's own unique
/// constraints: two tasks upserting the same key must never yield two rows.
pub trait GraphStore: Send + Sync {
    // ===== Graph Writes =====

    /// Inserts or replaces the content of the page keyed by `url`
    fn upsert_page(&self, url: &str, content: &PageContent) -> StorageResult<()>;

    /// Records the edge `from -> to`; re-discovery refreshes its timestamp
    fn upsert_link(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Appends one failed-attempt record
    fn insert_error(&self, url: &str, message: &str, proxy: Option<&str>) -> StorageResult<()>;

    // ===== Graph Reads =====

    /// Gets a page by URL
    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Gets all edges leaving `from`
    fn outgoing_links(&self, from: &str) -> StorageResult<Vec<LinkEdge>>;

    /// Gets all error records for `url`, oldest first
    fn errors_for(&self, url: &str) -> StorageResult<Vec<ErrorRecord>>;

    // ===== Statistics =====

    fn count_pages(&self) -> StorageResult<u64>;

    fn count_links(&self) -> StorageResult<u64>;

    fn count_errors(&self) -> StorageResult<u64>;

    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    fn create_run(&self, seed_url: &str, config_hash: &str) -> StorageResult<i64>;

    /// Sets the terminal status and finish timestamp of a run
    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets the most recent run that completed
    fn last_completed_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Lifecycle =====

    /// Closes the underlying connection; later calls return `Closed`
    fn close(&self) -> StorageResult<()>;
}
