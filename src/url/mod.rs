//! URL handling module
//!
//! This module provides URL normalization, link resolution and the
//! same-origin test used to keep the crawl on one documentation site.

mod normalize;

pub use normalize::{normalize_link, normalize_url};

use url::Url;

/// Returns true when both URLs share scheme, host and port
///
/// # Examples
///
/// ```
/// use handbook_crawler::url::is_same_origin;
/// use url::Url;
///
/// let a = Url::parse("https://docs.example.com/a").unwrap();
/// let b = Url::parse("https://docs.example.com/b?x=1").unwrap();
/// let c = Url::parse("http://docs.example.com/a").unwrap();
/// assert!(is_same_origin(&a, &b));
/// assert!(!is_same_origin(&a, &c));
/// ```
pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_origin_ignores_path_and_query() {
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://example.com/deep/b?q=1").unwrap();
        assert!(is_same_origin(&a, &b));
    }

    #[test]
    fn test_different_host_is_other_origin() {
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://other.example.com/a").unwrap();
        assert!(!is_same_origin(&a, &b));
    }

    #[test]
    fn test_different_port_is_other_origin() {
        let a = Url::parse("http://127.0.0.1:8080/a").unwrap();
        let b = Url::parse("http://127.0.0.1:9090/a").unwrap();
        assert!(!is_same_origin(&a, &b));
    }
}
