//! Storage module for persisting the crawl graph
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Idempotent page and link upserts
//! - The append-only error log
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteGraphStore;
pub use traits::{GraphStore, StorageError, StorageResult};

use crate::content::PageContent;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Opens (creating if needed) the graph store at `path`
pub fn open_storage(path: &Path) -> StorageResult<SqliteGraphStore> {
    SqliteGraphStore::open(path)
}

/// A stored page
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub url: String,
    pub content: PageContent,
    pub last_scraped: DateTime<Utc>,
}

/// A stored link edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEdge {
    pub from: String,
    pub to: String,
    pub discovered: DateTime<Utc>,
}

/// One failed attempt to process a URL
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub id: i64,
    pub url: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub proxy: Option<String>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub seed_url: String,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
