use crate::{UrlError, UrlResult};
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a URL into the key used by the visited-set and the store
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an HTTP(S) scheme and a host
/// 3. Remove the fragment (everything after #)
/// 4. Remove tracking query parameters
/// 5. Sort remaining query parameters alphabetically
/// 6. Remove an empty query string (trailing ?)
///
/// Host case and dot segments are normalized by the `url` parser itself.
/// Trailing slashes are kept: documentation sites commonly serve `/a` and
/// `/a/` as different documents.
///
/// # Examples
///
/// ```
/// use handbook_crawler::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/page?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Resolves an `href` found on `page_url` to a normalized absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: and data: schemes
/// - fragment-only hrefs and links that only add a fragment to `page_url`
///   (in-page anchors)
/// - invalid URLs and non-HTTP(S) URLs after resolution
///
/// A fragment on a link to a different page is dropped and the page itself
/// is kept.
pub fn normalize_link(href: &str, page_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = page_url.join(href).ok()?;

    if absolute.fragment().is_some() {
        let mut current = page_url.clone();
        current.set_fragment(None);
        let mut target = absolute.clone();
        target.set_fragment(None);
        if target == current {
            return None;
        }
    }

    normalize_parsed(absolute).ok()
}

fn normalize_parsed(mut url: Url) -> UrlResult<Url> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);

        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(filtered_params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
    }

    Ok(url)
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/a").unwrap()
    }

    #[test]
    fn test_keeps_scheme() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keeps_trailing_slash() {
        let result = normalize_url("https://example.com/guide/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/guide/");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result = normalize_url("https://example.com/page?utm_source=twitter&fbclid=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = normalize_url("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_lowercase_host() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_link_relative() {
        let link = normalize_link("/b", &page()).unwrap();
        assert_eq!(link.as_str(), "https://example.com/b");
    }

    #[test]
    fn test_link_in_page_anchor_excluded() {
        assert!(normalize_link("#section", &page()).is_none());
        assert!(normalize_link("/a#section", &page()).is_none());
        assert!(normalize_link("https://example.com/a#top", &page()).is_none());
    }

    #[test]
    fn test_link_to_other_page_drops_fragment() {
        let link = normalize_link("/b#install", &page()).unwrap();
        assert_eq!(link.as_str(), "https://example.com/b");
    }

    #[test]
    fn test_link_special_schemes_excluded() {
        for href in [
            "javascript:void(0)",
            "mailto:team@example.com",
            "tel:+1234567890",
            "data:text/html,<h1>x</h1>",
            "",
        ] {
            assert!(normalize_link(href, &page()).is_none(), "{href} should be excluded");
        }
    }

    #[test]
    fn test_link_self_is_kept() {
        let link = normalize_link("/a", &page()).unwrap();
        assert_eq!(link.as_str(), "https://example.com/a");
    }
}
