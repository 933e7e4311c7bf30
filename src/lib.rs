//! Handbook crawler: a polite documentation-site crawler
//!
//! This crate crawls a single documentation origin with a fixed pool of
//! reusable sessions, rotating egress proxies and bounded retries, and
//! persists the resulting page/link/error graph into SQLite.

pub mod config;
pub mod content;
pub mod crawler;
pub mod output;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
///
/// Only startup and teardown failures surface as a `CrawlError`; per-URL
/// failures are contained inside the crawl and recorded as error rows.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Resource pool error: {0}")]
    Pool(#[from] crawler::PoolError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A crawl is already in progress")]
    AlreadyRunning,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("No database configured (set output.database-path or DATABASE_PATH)")]
    MissingDatabase,
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use content::{ContentBlock, PageContent, PageMetadata};
pub use crawler::{run_crawl, run_crawl_with, CrawlOrchestrator, CrawlStatus};
pub use output::CrawlReport;
pub use crate::url::{is_same_origin, normalize_link, normalize_url};
