use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default crawl root
pub const DEFAULT_SEED_URL: &str = "https://handbook.mattermost.com";

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; HandbookBot/1.0; +http://example.com/bot)";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub proxies: ProxyConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
///
/// All delays are in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Root URL the crawl starts from
    #[serde(default = "default_seed_url")]
    pub seed_url: String,

    /// Number of concurrent crawl tasks (and pooled sessions)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Lower bound of the politeness window, also the inter-dispatch interval
    #[serde(default = "default_min_delay")]
    pub min_delay: u64,

    /// Upper bound of the politeness window
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,

    /// Attempts per URL before it is given up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pending-queue ceiling that triggers a dispatch pause
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Length of the dispatch pause once the ceiling is exceeded
    #[serde(default = "default_queue_cooldown")]
    pub queue_cooldown: u64,

    /// Upper bound on a single navigation
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: u64,

    /// Base unit of the retry backoff (`base * 2^attempt`)
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Cap on the failure cooldown of a single proxy
    #[serde(default = "default_max_proxy_cooldown")]
    pub max_proxy_cooldown: u64,
}

/// User agent configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserAgentConfig {
    /// Full user agent string; the built-in bot string is used when absent
    pub value: Option<String>,
}

/// Egress proxy configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Proxy URLs; an empty list means direct connections
    #[serde(default)]
    pub list: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(default)]
    pub database_path: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seed_url: default_seed_url(),
            max_concurrent: default_max_concurrent(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            max_retries: default_max_retries(),
            max_queue_size: default_max_queue_size(),
            queue_cooldown: default_queue_cooldown(),
            navigation_timeout: default_navigation_timeout(),
            backoff_base: default_backoff_base(),
            max_proxy_cooldown: default_max_proxy_cooldown(),
        }
    }
}

impl CrawlerConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay)
    }

    pub fn queue_cooldown(&self) -> Duration {
        Duration::from_millis(self.queue_cooldown)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base)
    }

    pub fn max_proxy_cooldown(&self) -> Duration {
        Duration::from_millis(self.max_proxy_cooldown)
    }
}

impl UserAgentConfig {
    /// Returns the configured user agent or the built-in default
    pub fn resolved(&self) -> String {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
            .to_string()
    }
}

fn default_seed_url() -> String {
    DEFAULT_SEED_URL.to_string()
}

fn default_max_concurrent() -> u32 {
    2
}

fn default_min_delay() -> u64 {
    2000
}

fn default_max_delay() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_queue_cooldown() -> u64 {
    5000
}

fn default_navigation_timeout() -> u64 {
    30_000
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_max_proxy_cooldown() -> u64 {
    300_000
}
