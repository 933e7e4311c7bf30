//! Page-loading sessions
//!
//! A [`Session`] is the unit the resource pool leases out: something that
//! can load one document at a time and be reset back to a blank state.
//! [`HttpSession`] is the shipped implementation on top of `reqwest`.

use crate::crawler::FetchError;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Resource types a session can refuse to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
}

/// Resource types blocked before every navigation
pub const BLOCKED_RESOURCES: &[ResourceKind] =
    &[ResourceKind::Image, ResourceKind::Stylesheet, ResourceKind::Font];

impl ResourceKind {
    /// Returns true if a response with this Content-Type is of this kind
    pub fn matches(&self, content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match self {
            Self::Image => mime.starts_with("image/"),
            Self::Stylesheet => mime == "text/css",
            Self::Font => {
                mime.starts_with("font/")
                    || mime.starts_with("application/font-")
                    || mime.starts_with("application/x-font-")
            }
        }
    }
}

/// Per-navigation settings
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    /// Egress proxy URL, or `None` for a direct connection
    pub proxy: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

/// A document loaded by a session
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub html: String,
}

/// A reusable page-loading session
#[async_trait]
pub trait Session: Send + 'static {
    /// Sets the resource types this session refuses to load
    fn configure(&mut self, blocked: &[ResourceKind]);

    /// Loads `url` and returns the resulting document
    async fn navigate(&mut self, url: &Url, options: &NavigateOptions)
        -> Result<LoadedPage, FetchError>;

    /// Discards any loaded page state
    async fn reset(&mut self) -> Result<(), FetchError>;

    /// Releases everything the session holds
    async fn close(&mut self) -> Result<(), FetchError>;
}

/// Builds an HTTP client, optionally routed through an egress proxy
///
/// # Arguments
///
/// * `proxy` - Proxy URL applied to every scheme, or `None`
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy URL or TLS backend failure
pub fn build_http_client(proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// HTTP-backed session
///
/// Only the document itself is requested, so subresources are never
/// loaded; a document whose Content-Type falls in a blocked kind is refused.
#[derive(Debug, Default)]
pub struct HttpSession {
    clients: HashMap<Option<String>, Client>,
    blocked: Vec<ResourceKind>,
    current: Option<Url>,
}

impl HttpSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL of the currently loaded document, if any
    pub fn current_url(&self) -> Option<&Url> {
        self.current.as_ref()
    }

    fn client_for(&mut self, url: &Url, proxy: Option<&str>) -> Result<Client, FetchError> {
        match self.clients.entry(proxy.map(str::to_string)) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let client = build_http_client(proxy).map_err(|e| FetchError::Navigation {
                    url: url.to_string(),
                    message: format!("failed to build client: {}", e),
                })?;
                Ok(entry.insert(client).clone())
            }
        }
    }
}

fn classify(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Navigation {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Session for HttpSession {
    fn configure(&mut self, blocked: &[ResourceKind]) {
        self.blocked = blocked.to_vec();
    }

    async fn navigate(
        &mut self,
        url: &Url,
        options: &NavigateOptions,
    ) -> Result<LoadedPage, FetchError> {
        let client = self.client_for(url, options.proxy.as_deref())?;
        self.current = None;

        let response = client
            .get(url.clone())
            .header(USER_AGENT, options.user_agent.as_str())
            .header(
                ACCEPT,
                HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
            )
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if self.blocked.iter().any(|kind| kind.matches(&content_type)) {
            return Err(FetchError::BlockedResource {
                url: url.to_string(),
                content_type,
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| classify(url, e))?;

        self.current = Some(final_url.clone());
        Ok(LoadedPage {
            final_url,
            status: status.as_u16(),
            html,
        })
    }

    async fn reset(&mut self) -> Result<(), FetchError> {
        self.current = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        self.current = None;
        self.clients.clear();
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_matching() {
        assert!(ResourceKind::Image.matches("image/png"));
        assert!(ResourceKind::Stylesheet.matches("text/css; charset=utf-8"));
        assert!(ResourceKind::Font.matches("font/woff2"));
        assert!(!ResourceKind::Image.matches("text/html"));
        assert!(!BLOCKED_RESOURCES
            .iter()
            .any(|k| k.matches("text/html; charset=utf-8")));
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(None).is_ok());
        assert!(build_http_client(Some("http://127.0.0.1:8080")).is_ok());
    }

    #[tokio::test]
    async fn test_reset_clears_current_document() {
        let mut session = HttpSession::new();
        session.current = Some(Url::parse("https://example.com/").unwrap());

        session.reset().await.unwrap();
        assert!(session.current_url().is_none());
    }
}
