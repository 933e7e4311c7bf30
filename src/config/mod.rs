//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the environment-variable overrides the crawler accepts.
//!
//! # Example
//!
//! ```no_run
//! use handbook_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawl root: {}", config.crawler.seed_url);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, OutputConfig, ProxyConfig, UserAgentConfig, DEFAULT_SEED_URL,
    DEFAULT_USER_AGENT,
};

pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
    parse_proxy_list,
};
pub use validation::validate;
