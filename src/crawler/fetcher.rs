//! Page fetching through a pooled session
//!
//! This module handles:
//! - Configuring resource blocking before each navigation
//! - Bounding navigation time and observing cancellation
//! - Handing the loaded document to the extractor
//! - Error classification for the retry loop

use crate::config::Config;
use crate::content::PageContent;
use crate::crawler::extractor::parse_page;
use crate::crawler::session::{NavigateOptions, Session, BLOCKED_RESOURCES};
use crate::storage::StorageError;
use crate::url::is_same_origin;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Errors from one attempt to process a URL
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Navigation to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Refused to load {url}: blocked content type {content_type}")]
    BlockedResource { url: String, content_type: String },

    #[error("Extraction failed for {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("Crawl cancelled")]
    Cancelled,
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    pub content: PageContent,
    /// Same-origin links, deduplicated
    pub links: Vec<Url>,
}

/// Loads pages through a session and extracts their content
#[derive(Debug, Clone)]
pub struct FetchExtractor {
    user_agent: String,
    navigation_timeout: Duration,
}

impl FetchExtractor {
    pub fn new(user_agent: impl Into<String>, navigation_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            navigation_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.user_agent.resolved(),
            config.crawler.navigation_timeout(),
        )
    }

    /// Fetches `url` and extracts its content and outgoing links
    ///
    /// # Arguments
    ///
    /// * `session` - A leased session; left holding the loaded page
    /// * `url` - The URL to load
    /// * `proxy` - Egress proxy for this attempt, if any
    /// * `cancel` - Aborts the navigation when cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - Content and links of the loaded page
    /// * `Err(FetchError)` - Navigation, timeout, extraction or cancellation
    pub async fn fetch<S: Session + ?Sized>(
        &self,
        session: &mut S,
        url: &Url,
        proxy: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        session.configure(BLOCKED_RESOURCES);

        let options = NavigateOptions {
            proxy: proxy.map(str::to_string),
            user_agent: self.user_agent.clone(),
            timeout: self.navigation_timeout,
        };

        let loaded = tokio::select! {
            result = tokio::time::timeout(self.navigation_timeout, session.navigate(url, &options)) => {
                match result {
                    Ok(loaded) => loaded?,
                    Err(_) => {
                        return Err(FetchError::Timeout {
                            url: url.to_string(),
                        })
                    }
                }
            }
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };

        let mut extracted =
            parse_page(&loaded.html, &loaded.final_url).map_err(|message| FetchError::Extraction {
                url: url.to_string(),
                message,
            })?;

        // A redirect must not lead the crawl off the requested origin
        extracted.links.retain(|link| is_same_origin(link, url));

        tracing::debug!(
            "Fetched {} (status {}, {} blocks, {} links)",
            loaded.final_url,
            loaded.status,
            extracted.content.blocks.len(),
            extracted.links.len()
        );

        Ok(FetchedPage {
            final_url: loaded.final_url,
            content: extracted.content,
            links: extracted.links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::session::fake::{FakeResponse, FakeSite};
    use crate::crawler::session::ResourceKind;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn fetcher() -> FetchExtractor {
        FetchExtractor::new("TestBot/1.0", Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_fetch_extracts_content_and_links() {
        let site = FakeSite::new();
        site.page(
            "https://docs.example.com/a",
            r#"<html><head><title>A</title></head><body><main>
                <p>Hello</p>
                <a href="/b">B</a><a href="https://elsewhere.com/">X</a>
            </main></body></html>"#,
        );
        let mut session = site.sessions(1).pop().unwrap();

        let page = fetcher()
            .fetch(
                &mut session,
                &url("https://docs.example.com/a"),
                Some("http://p1:8080"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(page.content.title, "A");
        assert_eq!(page.links, vec![url("https://docs.example.com/b")]);
        assert_eq!(session.blocked, BLOCKED_RESOURCES.to_vec());
        assert!(session.blocked.contains(&ResourceKind::Font));
        assert_eq!(site.proxies_used(), vec![Some("http://p1:8080".to_string())]);
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let site = FakeSite::new();
        site.script("https://docs.example.com/a", vec![FakeResponse::Status(500)]);
        let mut session = site.sessions(1).pop().unwrap();

        let result = fetcher()
            .fetch(
                &mut session,
                &url("https://docs.example.com/a"),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(FetchError::HttpStatus { status: 500, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_timeout() {
        let site = FakeSite::new();
        site.script("https://docs.example.com/slow", vec![FakeResponse::Hang]);
        let mut session = site.sessions(1).pop().unwrap();

        let result = fetcher()
            .fetch(
                &mut session,
                &url("https://docs.example.com/slow"),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(FetchError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_navigation() {
        let site = FakeSite::new();
        site.script("https://docs.example.com/slow", vec![FakeResponse::Hang]);
        let mut session = site.sessions(1).pop().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fetcher()
            .fetch(&mut session, &url("https://docs.example.com/slow"), None, &cancel)
            .await;

        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
