//! Static HTML manifest extraction.
//!
//! Fetches the page once and looks for a manifest URL written literally
//! into the markup, without executing any script. This covers players that
//! are configured server-side (`jwplayer().setup({file: "..."})`,
//! `sources: [{"file": "..."}]`) but not ones that build the URL at runtime.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::Resolver;
use crate::http_client::AcceleratedClient;

/// `"file":"https:\/\/cdn\/x.m3u8?..."` as produced by JSON encoding.
static ESCAPED_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"file"\s*:\s*"(https?:\\/\\/.*?m3u8[^"]*)""#).unwrap()
});

/// `"file":"https://cdn/x.m3u8?..."`
static PLAIN_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"file"\s*:\s*"(https?://.*?m3u8[^"]*)""#).unwrap());

/// Any bare manifest URL, terminated by whitespace or a quote.
static BARE_MANIFEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(https?://[^\s'"]+?\.m3u8[^\s'"]*)"#).unwrap());

static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

/// Find a manifest URL in page markup.
///
/// Inline scripts are scanned first, in document order, for a
/// `"file": "…m3u8…"` declaration (escaped variant before plain). If no
/// script declares one, the whole body is scanned for a bare manifest URL.
pub fn extract_manifest(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for script in document.select(&SCRIPT) {
        let body: String = script.text().collect();
        if body.is_empty() {
            continue;
        }
        if let Some(url) = capture(&ESCAPED_FILE, &body) {
            return Some(url.replace("\\/", "/"));
        }
        if let Some(url) = capture(&PLAIN_FILE, &body) {
            return Some(url);
        }
    }

    capture(&BARE_MANIFEST, html)
}

fn capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Fast tier: plain HTTP fetch plus [`extract_manifest`].
pub struct FastExtractor {
    client: AcceleratedClient,
    timeout: Duration,
}

impl FastExtractor {
    #[must_use]
    pub fn new(client: AcceleratedClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Resolver for FastExtractor {
    fn name(&self) -> &'static str {
        "fast"
    }

    async fn attempt(&self, page_url: &str) -> Option<String> {
        let html = match self.client.fetch_text(page_url, self.timeout).await {
            Ok(html) => html,
            Err(e) => {
                warn!(page_url, error = %e, "Page fetch failed");
                return None;
            }
        };
        debug!(page_url, bytes = html.len(), "Scanning page for manifest");
        extract_manifest(&html)
    }
}
