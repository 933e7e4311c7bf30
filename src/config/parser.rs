use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;

/// Loads and parses a configuration file from the given path
///
/// Environment overrides (`MAX_CONCURRENT_REQUESTS`, `MIN_REQUEST_DELAY`,
/// `MAX_REQUEST_DELAY`, `MAX_RETRIES`, `PROXY_LIST`, `USER_AGENT`,
/// `DATABASE_PATH`, `SEED_URL`) are applied after parsing and before
/// validation.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use handbook_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Max concurrent: {}", config.crawler.max_concurrent);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, |name| std::env::var(name).ok())
}

/// Parses configuration text, applying overrides from `lookup`
pub fn parse_config<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config = toml::from_str(content)?;
    apply_env_overrides(&mut config, lookup)?;
    validate(&config)?;
    Ok(config)
}

/// Applies environment-style overrides on top of a parsed configuration
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let crawler = &mut config.crawler;
    override_number(&lookup, "MAX_CONCURRENT_REQUESTS", &mut crawler.max_concurrent)?;
    override_number(&lookup, "MIN_REQUEST_DELAY", &mut crawler.min_delay)?;
    override_number(&lookup, "MAX_REQUEST_DELAY", &mut crawler.max_delay)?;
    override_number(&lookup, "MAX_RETRIES", &mut crawler.max_retries)?;

    if let Some(seed) = lookup("SEED_URL").filter(|v| !v.trim().is_empty()) {
        crawler.seed_url = seed.trim().to_string();
    }

    if let Some(list) = lookup("PROXY_LIST") {
        config.proxies.list = parse_proxy_list(&list);
    }

    if let Some(user_agent) = lookup("USER_AGENT").filter(|v| !v.trim().is_empty()) {
        config.user_agent.value = Some(user_agent);
    }

    if let Some(path) = lookup("DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
        config.output.database_path = path;
    }

    Ok(())
}

/// Splits a comma-separated proxy list, dropping blank entries
pub fn parse_proxy_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn override_number<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(());
        }
        *target = raw.parse().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.to_string(),
        })?;
    }
    Ok(())
}

/// Computes a SHA-256 hash of the effective configuration
///
/// The hash covers the configuration after environment overrides, so two
/// runs with the same file but different overrides are told apart.
pub fn compute_config_hash(config: &Config) -> Result<String, ConfigError> {
    let canonical = toml::to_string(config)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(&config)?;
    Ok((config, hash))
}
