//! The [`Fetcher`] seam and its HTTP implementation.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};
use url::{Host, Url};

use seedcrawl_shared::{CrawlConfig, Document, Properties, Result, SeedcrawlError};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("seedcrawl/", env!("CARGO_PKG_VERSION"));

/// Length of a document id in hex characters.
const DOCUMENT_ID_LEN: usize = 32;

/// Resolves a document into the documents it links to.
///
/// Implementations may be called concurrently with themselves.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the direct children of `document`.
    async fn fetch(&self, document: &Document) -> Result<Vec<Document>>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Fetches a document's outbound links over HTTP, a bounded number at a time.
pub struct HttpFetcher {
    client: Client,
    max_links_per_page: usize,
    max_concurrent_requests: usize,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_localhost: bool,
}

impl HttpFetcher {
    /// Create a fetcher from the crawl configuration.
    ///
    /// `timeout_secs` bounds each request on its own, so one slow link never
    /// costs the other links of the same seed.
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SeedcrawlError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_links_per_page: config.max_links_per_page,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %document.url))]
    async fn fetch(&self, document: &Document) -> Result<Vec<Document>> {
        let targets: Vec<Url> = child_targets(document, self.max_links_per_page)
            .into_iter()
            .filter(|url| {
                let blocked = !self.allow_localhost && is_ssrf_target(url);
                if blocked {
                    warn!(%url, "SSRF protection: blocked");
                }
                !blocked
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_requests));
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let client = self.client.clone();
            let semaphore = Arc::clone(&semaphore);
            let parent_id = document.id.clone();

            tasks.spawn(async move {
                let outcome = async {
                    let _permit = semaphore.acquire().await.map_err(|_| {
                        SeedcrawlError::fetch(target.as_str(), "request slots closed")
                    })?;
                    fetch_url(&client, &target, &parent_id).await
                }
                .await;
                (index, target, outcome)
            });
        }

        let mut fetched = Vec::with_capacity(targets.len());
        let mut last_error = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(child))) => fetched.push((index, child)),
                Ok((_, target, Err(e))) => {
                    warn!(url = %target, error = %e, "skipping link");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(error = %e, "link task failed");
                    last_error = Some(SeedcrawlError::fetch(&document.url, e.to_string()));
                }
            }
        }

        if fetched.is_empty() {
            if let Some(e) = last_error {
                return Err(SeedcrawlError::fetch(
                    &document.url,
                    format!("all {} links failed, last error: {e}", targets.len()),
                ));
            }
        }

        // Children come back in link order regardless of completion order.
        fetched.sort_by_key(|(index, _)| *index);
        let children: Vec<Document> = fetched.into_iter().map(|(_, child)| child).collect();

        debug!(children = children.len(), attempted = targets.len(), "fetched children");
        Ok(children)
    }
}

async fn fetch_url(client: &Client, url: &Url, parent_id: &str) -> Result<Document> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| SeedcrawlError::fetch(url.as_str(), e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SeedcrawlError::fetch(url.as_str(), format!("HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SeedcrawlError::fetch(url.as_str(), format!("body read failed: {e}")))?;

    let parsed = parse_page(&body, url)?;

    let mut properties = Properties::new();
    properties.insert("status_code".into(), status.as_u16().into());
    properties.insert("parent_id".into(), parent_id.into());
    properties.insert("fetched_at".into(), Utc::now().to_rfc3339().into());

    Ok(Document {
        id: document_id_for_url(url),
        url: url.to_string(),
        title: parsed.title,
        content: parsed.text,
        links: parsed.links,
        properties,
    })
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets loopback, private or otherwise internal hosts.
fn is_ssrf_target(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }

    match url.host() {
        Some(Host::Ipv4(ip)) => is_private_ip(&IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_private_ip(&IpAddr::V6(ip)),
        Some(Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (a == 100 && (b & 0xC0) == 64)
                || (a == 192 && b == 0 && c == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page parsing
// ---------------------------------------------------------------------------

struct ParsedPage {
    title: String,
    text: String,
    links: Vec<String>,
}

/// Extract title, visible text and links. Kept synchronous since `Html` is not `Send`.
fn parse_page(body: &str, url: &Url) -> Result<ParsedPage> {
    let doc = Html::parse_document(body);

    let first_text = |css: &str| -> Result<Option<String>> {
        let sel = selector(css)?;
        Ok(doc
            .select(&sel)
            .next()
            .map(|el| collapse_whitespace(el.text()))
            .filter(|t| !t.is_empty()))
    };

    let title = match first_text("title")? {
        Some(title) => title,
        None => first_text("h1")?.unwrap_or_else(|| url.to_string()),
    };
    let text = first_text("body")?.unwrap_or_default();
    let links = extract_links(&doc, url)?;

    Ok(ParsedPage { title, text, links })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| SeedcrawlError::parse(format!("bad selector '{css}': {e}")))
}

fn collapse_whitespace<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract all links from a document, resolved against the base URL.
pub fn extract_links(doc: &Html, base_url: &Url) -> Result<Vec<String>> {
    let link_sel = selector("a[href]")?;
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };

        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        if let Ok(mut resolved) = base_url.join(href) {
            resolved.set_fragment(None);
            links.push(resolved.to_string());
        }
    }

    Ok(links)
}

/// The http(s) links of `document` worth fetching: fragment-free, unique, capped.
fn child_targets(document: &Document, max_links: usize) -> Vec<Url> {
    let mut seen = HashSet::new();
    document
        .links
        .iter()
        .filter_map(|link| Url::parse(link).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .filter(|url| seen.insert(normalize_url(url)))
        .take(max_links)
        .collect()
}

/// Normalize a URL for deduplication (strip fragment and non-root trailing slash).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    if s.ends_with('/') && normalized.path() != "/" {
        s.pop();
    }
    s
}

/// Stable 32-hex-character id derived from the normalized URL.
pub fn document_id_for_url(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_url(url).as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(DOCUMENT_ID_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::engine::{ExpandOptions, SilentProgress, expand};

    fn local_fetcher(config: &CrawlConfig) -> HttpFetcher {
        HttpFetcher::new(config).unwrap().allow_localhost()
    }

    fn html_page(title: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_string(format!("<html><head><title>{title}</title></head></html>"))
    }

    #[test]
    fn test_normalize_url() {
        let url = Url::parse("https://docs.example.com/guide/intro/#section-1").unwrap();
        assert_eq!(normalize_url(&url), "https://docs.example.com/guide/intro");

        let root = Url::parse("https://docs.example.com/").unwrap();
        assert_eq!(normalize_url(&root), "https://docs.example.com/");
    }

    #[test]
    fn test_document_id_for_url() {
        let a = Url::parse("https://example.com/page").unwrap();
        let a_slash = Url::parse("https://example.com/page/#top").unwrap();
        let b = Url::parse("https://example.com/other").unwrap();

        let id = document_id_for_url(&a);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_eq!(id, document_id_for_url(&a_slash));
        assert_ne!(id, document_id_for_url(&b));
    }

    #[test]
    fn test_extract_links() {
        let html = concat!(
            r#"<html><body><a href="/page2">Page 2</a>"#,
            r#"<a href="https://external.com">External</a>"#,
            r##"<a href="#section">Anchor</a><a href="mailto:me@x.com">Mail</a>"##,
            r##"<a href="relative/path#frag">Relative</a></body></html>"##,
        );

        let doc = Html::parse_document(html);
        let base = Url::parse("https://docs.example.com/page1").unwrap();
        let links = extract_links(&doc, &base).unwrap();

        assert_eq!(
            links,
            vec![
                "https://docs.example.com/page2".to_string(),
                "https://external.com/".to_string(),
                "https://docs.example.com/relative/path".to_string(),
            ]
        );
    }

    #[test]
    fn test_child_targets_filters_and_caps() {
        let doc = Document::new("seed", "https://example.com/").with_links([
            "https://example.com/a",
            "https://example.com/a#again",
            "ftp://example.com/file",
            "not a url",
            "https://example.com/b",
            "https://example.com/c",
        ]);

        let targets = child_targets(&doc, 2);
        let targets: Vec<&str> = targets.iter().map(Url::as_str).collect();
        assert_eq!(targets, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_parse_page_title_fallbacks() {
        let url = Url::parse("https://example.com/x").unwrap();

        let html = "<html><head><title> Real  Title </title></head></html>";
        let parsed = parse_page(html, &url).unwrap();
        assert_eq!(parsed.title, "Real Title");

        let html = "<html><body><h1>Heading</h1><p>one\n two</p></body></html>";
        let parsed = parse_page(html, &url).unwrap();
        assert_eq!(parsed.title, "Heading");
        assert_eq!(parsed.text, "Heading one two");

        let parsed = parse_page("<html><body></body></html>", &url).unwrap();
        assert_eq!(parsed.title, "https://example.com/x");
    }

    #[tokio::test]
    async fn test_fetch_children_from_mock_server() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                "<html><head><title>Page A</title></head>",
                r#"<body><p>Alpha</p><a href="/a/deeper">Deeper</a></body></html>"#,
            )))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><h1>Page B</h1></body></html>",
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let seed = Document::new("seed-id", format!("{}/", server.uri())).with_links([
            format!("{}/a", server.uri()),
            format!("{}/missing", server.uri()),
            format!("{}/b", server.uri()),
            "mailto:someone@example.com".to_string(),
        ]);

        let fetcher = local_fetcher(&CrawlConfig::default());
        let children = fetcher.fetch(&seed).await.unwrap();

        assert_eq!(children.len(), 2);
        let a = &children[0];
        assert_eq!(a.title, "Page A");
        assert!(a.content.contains("Alpha"));
        assert_eq!(a.links, vec![format!("{}/a/deeper", server.uri())]);
        assert_eq!(a.id, document_id_for_url(&Url::parse(&a.url).unwrap()));
        assert_eq!(a.properties["parent_id"], "seed-id");
        assert_eq!(a.properties["status_code"], 200);
        assert_eq!(children[1].title, "Page B");
    }

    #[tokio::test]
    async fn test_fetch_fails_when_every_link_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let seed = Document::new("seed-id", server.uri())
            .with_links([format!("{}/x", server.uri()), format!("{}/y", server.uri())]);

        let fetcher = local_fetcher(&CrawlConfig::default());
        let err = fetcher.fetch(&seed).await.unwrap_err();
        assert!(matches!(err, SeedcrawlError::Fetch { .. }));
        assert!(err.to_string().contains("all 2 links failed"));
    }

    #[tokio::test]
    async fn test_fetch_without_links_is_empty() {
        let fetcher = HttpFetcher::new(&CrawlConfig::default()).unwrap();
        let seed = Document::new("lonely", "https://example.com/lonely");
        assert!(fetcher.fetch(&seed).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_links_are_fetched_concurrently_within_seed_budget() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(html_page("Slow").set_delay(Duration::from_millis(200)))
            .expect(5)
            .mount(&server)
            .await;

        let seed = Document::new("seed-id", format!("{}/", server.uri()))
            .with_links((0..5).map(|i| format!("{}/page{i}", server.uri())));
        let fetcher = local_fetcher(&CrawlConfig::default());
        let options = ExpandOptions {
            fetch_timeout: Some(Duration::from_millis(500)),
            ..ExpandOptions::new(1)
        };

        let (merged, stats) = expand(Arc::new(fetcher), vec![seed], &options, &SilentProgress)
            .await
            .unwrap();

        assert!(stats.failures.is_empty(), "failures: {:?}", stats.failures);
        assert_eq!(merged.len(), 6);
        let urls: Vec<String> = merged[1..].iter().map(|d| d.url.clone()).collect();
        let expected: Vec<String> = (0..5).map(|i| format!("{}/page{i}", server.uri())).collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn test_slow_link_times_out_alone() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(html_page("Fast"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/stuck"))
            .respond_with(html_page("Stuck").set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let seed = Document::new("seed-id", format!("{}/", server.uri()))
            .with_links([format!("{}/stuck", server.uri()), format!("{}/fast", server.uri())]);
        let config = CrawlConfig {
            timeout_secs: 1,
            ..CrawlConfig::default()
        };

        let started = Instant::now();
        let children = local_fetcher(&config).fetch(&seed).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title, "Fast");
    }

    #[tokio::test]
    async fn test_private_addresses_are_not_fetched() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(html_page("Internal"))
            .expect(0)
            .mount(&server)
            .await;

        let seed = Document::new("seed-id", "https://example.com/")
            .with_links([format!("{}/admin", server.uri())]);
        let fetcher = HttpFetcher::new(&CrawlConfig::default()).unwrap();

        assert!(fetcher.fetch(&seed).await.unwrap().is_empty());
    }

    #[test]
    fn test_ssrf_protection_blocks_internal_hosts() {
        for url in [
            "file:///etc/passwd",
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://127.0.0.1:8080/",
            "http://[::1]:3000/",
            "http://localhost:3000/api",
            "http://printer.local/",
        ] {
            assert!(is_ssrf_target(&Url::parse(url).unwrap()), "{url}");
        }
    }

    #[test]
    fn test_ssrf_protection_allows_public() {
        let url = Url::parse("https://docs.example.com/page").unwrap();
        assert!(!is_ssrf_target(&url));
    }
}
