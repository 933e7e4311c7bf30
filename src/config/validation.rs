use crate::config::types::{Config, CrawlerConfig, OutputConfig, ProxyConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_proxy_config(&config.proxies)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.min_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "min-delay ({}ms) cannot exceed max-delay ({}ms)",
            config.min_delay, config.max_delay
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max-retries must be >= 1, got 0".to_string(),
        ));
    }

    if config.max_queue_size < 1 {
        return Err(ConfigError::Validation(
            "max-queue-size must be >= 1, got 0".to_string(),
        ));
    }

    if config.navigation_timeout < 1000 {
        return Err(ConfigError::Validation(format!(
            "navigation-timeout must be >= 1000ms, got {}ms",
            config.navigation_timeout
        )));
    }

    validate_seed_url(&config.seed_url)?;

    Ok(())
}

/// Validates the crawl root: absolute, HTTP(S), with a host
fn validate_seed_url(seed: &str) -> Result<(), ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed-url '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "seed-url '{}' must use the HTTP or HTTPS scheme",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "seed-url '{}' has no host",
            seed
        )));
    }

    Ok(())
}

/// Validates proxy entries
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for proxy in &config.list {
        if proxy.trim().is_empty() {
            return Err(ConfigError::Validation(
                "proxy entries cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::MissingDatabase);
    }
    Ok(())
}
