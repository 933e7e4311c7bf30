//! HTML extraction of structured content and links
//!
//! This module handles parsing a loaded document to extract:
//! - Same-origin links to follow (from `<a>` tags)
//! - The page title and `<meta>` metadata
//! - Top-level content blocks, after stripping site chrome

use crate::content::{ContentBlock, PageContent, PageMetadata};
use crate::url::{is_same_origin, normalize_link};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements removed before content extraction
const CHROME_SELECTOR: &str = "nav, footer, .sidebar, script, style, iframe, .announcement-bar";

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub content: PageContent,

    /// Same-origin outgoing links, normalized and deduplicated in document order
    pub links: Vec<Url>,
}

/// Parses HTML content and extracts structured content and links
///
/// # Link Extraction Rules
///
/// Chrome (nav, footer, sidebar, banners) is stripped first, so only links
/// in the remaining document are followed.
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and data URIs
/// - In-page anchors (links back to the page itself plus a fragment)
/// - Links to another origin
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the document was loaded from
///
/// # Returns
///
/// * `Ok(ExtractedPage)` - Successfully parsed page
/// * `Err(String)` - A selector failed to compile
///
/// # Example
///
/// ```no_run
/// use handbook_crawler::crawler::parse_page;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><main><p>Hi</p><a href="/page">Link</a></main></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let page = parse_page(html, &page_url).unwrap();
/// assert_eq!(page.content.title, "Test");
/// ```
pub fn parse_page(html: &str, page_url: &Url) -> Result<ExtractedPage, String> {
    let mut document = Html::parse_document(html);

    strip_chrome(&mut document)?;
    let links = extract_links(&document, page_url)?;

    let content = PageContent {
        title: extract_title(&document)?,
        blocks: extract_blocks(&document, page_url)?,
        metadata: extract_metadata(&document)?,
    };

    Ok(ExtractedPage { content, links })
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {:?}: {:?}", css, e))
}

fn extract_links(document: &Html, page_url: &Url) -> Result<Vec<Url>, String> {
    let a_selector = selector("a[href]")?;
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(link) = normalize_link(href, page_url) {
            if is_same_origin(&link, page_url) && seen.insert(link.as_str().to_string()) {
                links.push(link);
            }
        }
    }

    Ok(links)
}

fn strip_chrome(document: &mut Html) -> Result<(), String> {
    let chrome = selector(CHROME_SELECTOR)?;
    let ids: Vec<_> = document.select(&chrome).map(|element| element.id()).collect();

    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    Ok(())
}

fn extract_title(document: &Html) -> Result<String, String> {
    let title_selector = selector("head > title")?;

    Ok(document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(element.text()))
        .unwrap_or_default())
}

fn extract_metadata(document: &Html) -> Result<PageMetadata, String> {
    let last_modified = selector(
        "meta[name='last-modified'], meta[http-equiv='last-modified'], meta[property='article:modified_time']",
    )?;
    let author = selector("meta[name='author']")?;

    let content_of = |sel: &Selector| {
        document
            .select(sel)
            .filter_map(|element| element.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(str::to_string)
    };

    Ok(PageMetadata {
        last_modified: content_of(&last_modified),
        author: content_of(&author),
    })
}

/// One block per element child of `<main>`, or of `<body>` without one
fn extract_blocks(document: &Html, page_url: &Url) -> Result<Vec<ContentBlock>, String> {
    let main_selector = selector("main")?;
    let body_selector = selector("body")?;

    let root = document
        .select(&main_selector)
        .next()
        .or_else(|| document.select(&body_selector).next());

    let Some(root) = root else {
        return Ok(Vec::new());
    };

    let mut blocks = Vec::new();
    for child in root.children().filter_map(ElementRef::wrap) {
        let kind = child.value().name();

        match kind {
            "table" => blocks.push(ContentBlock::text(kind, child.html())),
            "img" => {
                let Some(src) = child.value().attr("src") else {
                    continue;
                };
                let src = page_url
                    .join(src.trim())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| src.to_string());
                let alt = child.value().attr("alt").unwrap_or("").trim();
                blocks.push(ContentBlock::image(src, alt));
            }
            _ => {
                let text = collapse_whitespace(child.text());
                if !text.is_empty() {
                    blocks.push(ContentBlock::text(kind, text));
                }
            }
        }
    }

    Ok(blocks)
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let text: String = parts.collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
