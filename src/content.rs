//! Structured page content model
//!
//! This is the document shape stored for every crawled page. It is
//! serialized as JSON in the `pages.content` column.

use serde::{Deserialize, Serialize};

/// Structured content extracted from one documentation page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    /// Document title (empty when the page has no `<title>`)
    pub title: String,

    /// Top-level content blocks in document order
    #[serde(rename = "content")]
    pub blocks: Vec<ContentBlock>,

    pub metadata: PageMetadata,
}

/// One structural block of a page, tagged by its element kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Lowercase element name (`p`, `h2`, `table`, `img`, ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Raw markup for tables, image source for images, visible text otherwise
    pub content: String,

    /// Alt text, only set on image blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// Page metadata read from `<meta>` tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub last_modified: Option<String>,
    pub author: Option<String>,
}

impl ContentBlock {
    pub fn text(kind: &str, content: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            content: content.into(),
            alt: None,
        }
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            kind: "img".to_string(),
            content: src.into(),
            alt: Some(alt.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let content = PageContent {
            title: "Guide".to_string(),
            blocks: vec![
                ContentBlock::text("p", "Hello"),
                ContentBlock::image("https://example.com/logo.png", "Logo"),
            ],
            metadata: PageMetadata {
                last_modified: Some("2024-01-01".to_string()),
                author: None,
            },
        };

        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["title"], "Guide");
        assert_eq!(json["content"][0]["type"], "p");
        assert!(json["content"][0].get("alt").is_none());
        assert_eq!(json["content"][1]["alt"], "Logo");
        assert_eq!(json["metadata"]["lastModified"], "2024-01-01");
    }
}
