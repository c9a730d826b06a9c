//! Page scraping module for content extraction.
//!
//! Uses reqwest for fetching and scraper for HTML parsing. Extraction keeps
//! only the *direct* text of each candidate element so nested markup does not
//! repeat its descendants' text.

use crate::config::ScraperConfig;
use lazy_static::lazy_static;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// User-Agent string identifying this scraper
const USER_AGENT: &str = concat!("policypal/", env!("CARGO_PKG_VERSION"));

/// Maximum characters forwarded to the summarisation service
pub const MAX_PAYLOAD_CHARS: usize = 60_000;

/// Elements whose direct text is collected
const CANDIDATE_TAGS: &str =
    "p, div, span, article, section, b, u, li, ol, strong, em, blockquote, br, h1, h2, h3, h4, h5";

/// Class-name fragments marking navigation and boilerplate
const EXCLUDED_CLASS_KEYWORDS: &[&str] = &[
    "head",
    "footer",
    "nav",
    "menu",
    "overlay",
    "bottom",
    "map",
    "button",
    "btn",
    "navigation",
    "popup",
    "notice",
];

lazy_static! {
    static ref CANDIDATES: Selector =
        Selector::parse(CANDIDATE_TAGS).expect("candidate selector is valid");
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("failed to fetch URL: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("failed to read {0}: {1}")]
    ReadError(String, std::io::Error),
}

/// Text scraped from a single page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedDocument {
    /// Space-joined, deduplicated text fragments
    pub text: String,
    /// The page URL
    pub url: String,
}

impl ScrapedDocument {
    /// Scrape an HTML string
    pub fn from_html(html: &str, url: impl Into<String>) -> Self {
        let document = Html::parse_document(html);
        Self {
            text: scrape(&document),
            url: url.into(),
        }
    }

    /// URL path, e.g. `/legal/privacy`. Empty when the URL does not parse.
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Create a configured HTTP client for scraping
fn create_client(config: &ScraperConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
}

/// Fetch a page over HTTP and scrape it
pub async fn fetch_document(
    url: &str,
    config: &ScraperConfig,
) -> Result<ScrapedDocument, ScraperError> {
    let client = create_client(config)?;

    let response = client.get(url).send().await?.error_for_status()?;
    let html = response.text().await?;
    let document = ScrapedDocument::from_html(&html, url);

    debug!(url, chars = document.text.len(), "scraped remote page");
    Ok(document)
}

/// Read a local HTML file and scrape it
pub fn load_document(path: &Path) -> Result<ScrapedDocument, ScraperError> {
    let html = std::fs::read_to_string(path)
        .map_err(|e| ScraperError::ReadError(path.display().to_string(), e))?;
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let url = url::Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| absolute.display().to_string());

    let document = ScrapedDocument::from_html(&html, url);
    debug!(path = %path.display(), chars = document.text.len(), "scraped local page");
    Ok(document)
}

/// Fetch `target` when it is an http(s) URL, otherwise read it as a local file
pub async fn load_target(
    target: &str,
    config: &ScraperConfig,
) -> Result<ScrapedDocument, ScraperError> {
    if target.starts_with("http://") || target.starts_with("https://") {
        fetch_document(target, config).await
    } else {
        load_document(Path::new(target))
    }
}

/// Collect the visible, deduplicated text of a document.
///
/// Fragments keep the order in which they first appear. An empty string means
/// nothing scrapable was found.
pub fn scrape(document: &Html) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut fragments: Vec<String> = Vec::new();

    for element in document.select(&CANDIDATES) {
        if is_excluded(&element) {
            continue;
        }
        if let Some(text) = direct_text(&element) {
            if seen.insert(text.clone()) {
                fragments.push(text);
            }
        }
    }

    fragments.join(" ")
}

fn is_excluded(element: &ElementRef) -> bool {
    let class = element
        .value()
        .attr("class")
        .unwrap_or_default()
        .to_lowercase();
    EXCLUDED_CLASS_KEYWORDS
        .iter()
        .any(|keyword| class.contains(keyword))
}

/// Text of the first child text node, whitespace-collapsed
fn direct_text(element: &ElementRef) -> Option<String> {
    let node = element.children().find_map(|child| child.value().as_text())?;
    let collapsed = node.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Cap the payload at `max` characters
pub fn truncate_payload(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrape_str(html: &str) -> String {
        scrape(&Html::parse_document(html))
    }

    #[test]
    fn identical_fragments_appear_once() {
        let html = r#"<html><body>
            <p>We collect your email address.</p>
            <div>We collect your email address.</div>
            <p>We share it with partners.</p>
        </body></html>"#;

        assert_eq!(
            scrape_str(html),
            "We collect your email address. We share it with partners."
        );
    }

    #[test]
    fn excluded_classes_match_substrings_case_insensitively() {
        let html = r#"<html><body>
            <div class="SiteHeader">Home</div>
            <ul class="main-navbar"><li>Products</li></ul>
            <div class="cookieNotice-banner">We use cookies</div>
            <p class="content">Keep this sentence.</p>
        </body></html>"#;

        // The <li> has no class of its own, so its text survives.
        assert_eq!(scrape_str(html), "Products Keep this sentence.");
    }

    #[test]
    fn only_direct_text_is_taken() {
        let html = r#"<html><body>
            <div>  Leading   text
                <span>inner</span> trailing</div>
            <section><p>nested only</p></section>
        </body></html>"#;

        // The div yields its first text node only; the section has no
        // direct text but the nested <p> does.
        assert_eq!(scrape_str(html), "Leading text inner nested only");
    }

    #[test]
    fn blank_first_text_node_contributes_nothing() {
        let html = "<html><body><div>\n   <b>bold</b> after</div></body></html>";
        assert_eq!(scrape_str(html), "bold");
    }

    #[test]
    fn empty_page_scrapes_to_empty_string() {
        let document = ScrapedDocument::from_html("<html><body></body></html>", "https://x.test/");
        assert!(document.is_empty());
    }

    #[test]
    fn path_comes_from_url() {
        let document = ScrapedDocument::from_html("", "https://example.com/legal/Privacy?x=1");
        assert_eq!(document.path(), "/legal/Privacy");
        let broken = ScrapedDocument::from_html("", "not a url");
        assert_eq!(broken.path(), "");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_payload("abcdef", 4), "abcd");
        assert_eq!(truncate_payload("abc", 10), "abc");
        assert_eq!(truncate_payload("héllo", 2), "hé");

        let long = "x".repeat(MAX_PAYLOAD_CHARS + 50);
        assert_eq!(
            truncate_payload(&long, MAX_PAYLOAD_CHARS).chars().count(),
            MAX_PAYLOAD_CHARS
        );
    }

    #[test]
    fn local_file_is_scraped_with_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.html");
        std::fs::write(&path, "<p>These terms of service apply.</p>").unwrap();

        let document = load_document(&path).unwrap();
        assert_eq!(document.text, "These terms of service apply.");
        assert!(document.url.starts_with("file://"));
        assert!(document.path().ends_with("terms.html"));
    }

    #[tokio::test]
    async fn fetches_and_scrapes_remote_page() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/privacy"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body><p>This Privacy Policy applies.</p></body></html>"),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/privacy", mock_server.uri());
        let document = fetch_document(&url, &ScraperConfig::default()).await.unwrap();
        assert_eq!(document.text, "This Privacy Policy applies.");
        assert_eq!(document.path(), "/privacy");
    }
}
