//! Outbound HTTP client for page fetches
//!
//! Features:
//! - HTTP/2 when the server negotiates it, HTTP/1.1 otherwise
//! - Brotli, Zstd, Gzip compression (auto-negotiated)
//! - Cookie jar, so hosts that bounce through a cookie-setting redirect work
//! - Connection pooling with keep-alive
//! - Desktop browser fingerprint sent with every request

use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use crate::fingerprint::{chrome_profile, BrowserProfile};

/// HTTP client carrying a fixed browser profile.
pub struct AcceleratedClient {
    client: Client,
    profile: BrowserProfile,
}

impl AcceleratedClient {
    /// Create a client with a random desktop Chrome profile.
    pub fn new() -> Result<Self> {
        Self::with_profile(chrome_profile())
    }

    /// Create client with specific browser profile
    pub fn with_profile(profile: BrowserProfile) -> Result<Self> {
        let headers = profile.to_headers();

        let client = Client::builder()
            // Let the server negotiate; embed hosts are often HTTP/1.1 only
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .zstd(true)
            .gzip(true)
            .deflate(true)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()?;

        Ok(Self { client, profile })
    }

    /// Fetch a URL, failing on transport errors, timeout and non-2xx status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        debug!(
            status = %response.status(),
            version = ?response.version(),
            content_encoding = ?response.headers().get("content-encoding"),
            "Response received"
        );

        Ok(response)
    }

    /// Fetch and return body as string
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self.fetch(url, timeout).await?;
        let text = response.text().await?;
        Ok(text)
    }

    /// Browser profile sent with every request
    #[must_use]
    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }
}
