//! Core domain types for seedcrawl.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Schema-free page properties (`properties` in the stored record).
pub type Properties = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// Identifying metadata of a stored page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// 32-character lowercase hex identifier.
    pub id: String,
    /// Source URL; usually embeds the dash-free form of `id`.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Open mapping of extra properties.
    pub properties: Properties,
}

/// A fetched page as it is stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub metadata: PageMetadata,
    /// Page body.
    pub content: String,
    /// Outbound URLs, in document order.
    pub urls: Vec<String>,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A seed or crawled unit of content.
///
/// Equality and hashing only look at `id` and `url`, so two fetches of the
/// same page collapse into one entry in a set even if their bodies differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Outbound links discovered on this document.
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Document {
    /// Create a document with an identity and no content.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: String::new(),
            content: String::new(),
            links: Vec::new(),
            properties: Properties::new(),
        }
    }

    /// Attach outbound links.
    pub fn with_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links = links.into_iter().map(Into::into).collect();
        self
    }

    /// The `(id, url)` pair used for equality and hashing.
    pub fn identity(&self) -> (&str, &str) {
        (&self.id, &self.url)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl From<Page> for Document {
    fn from(page: Page) -> Self {
        Self {
            id: page.metadata.id,
            url: page.metadata.url,
            title: page.metadata.title,
            content: page.content,
            links: page.urls,
            properties: page.metadata.properties,
        }
    }
}

impl From<&Document> for Page {
    fn from(doc: &Document) -> Self {
        Self {
            metadata: PageMetadata {
                id: doc.id.clone(),
                url: doc.url.clone(),
                title: doc.title.clone(),
                properties: doc.properties.clone(),
            },
            content: doc.content.clone(),
            urls: doc.links.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn sample_page() -> Page {
        let mut properties = Properties::new();
        properties.insert("tags".into(), serde_json::json!(["rust", "crawl"]));
        Page {
            metadata: PageMetadata {
                id: "0123456789abcdef0123456789abcdef".into(),
                url: "https://notes.example.com/Intro-0123456789abcdef0123456789abcdef".into(),
                title: "Intro".into(),
                properties,
            },
            content: "Hello, wörld".into(),
            urls: vec!["https://example.com/next".into()],
        }
    }

    #[test]
    fn document_equality_uses_identity_only() {
        let mut a = Document::new("a", "http://x/a");
        a.content = "first fetch".into();
        let mut b = Document::new("a", "http://x/a");
        b.content = "second fetch".into();
        assert_eq!(a, b);

        let other_url = Document::new("a", "http://x/a?v=2");
        assert_ne!(a, other_url);

        let set: HashSet<Document> = [a, b, other_url].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn page_document_conversion_is_lossless() {
        let page = sample_page();
        let doc = Document::from(page.clone());
        assert_eq!(doc.links, page.urls);
        assert_eq!(doc.properties, page.metadata.properties);
        assert_eq!(Page::from(&doc), page);
    }

    #[test]
    fn page_serializes_with_nested_metadata() {
        let value = serde_json::to_value(sample_page()).expect("serialize");
        assert_eq!(value["metadata"]["title"], "Intro");
        assert_eq!(value["urls"][0], "https://example.com/next");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn page_fixture_validates() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/page.fixture.json")
            .expect("read fixture");
        let parsed: Page = serde_json::from_str(&fixture).expect("deserialize fixture page");
        assert_eq!(parsed.metadata.id.len(), 32);
        assert!(parsed.metadata.url.contains(&parsed.metadata.id));
        assert_eq!(parsed.urls.len(), 2);
    }
}
