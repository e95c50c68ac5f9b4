//! Manifest relay.
//!
//! Opens the upstream manifest with the headers a player embedded in the
//! embed page would send, and hands back the response so its body can
//! be streamed to the client chunk by chunk.

use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::header::{REFERER, USER_AGENT};
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use crate::error::ProxyError;
use crate::fingerprint::PROXY_USER_AGENT;

/// Content type declared for every relayed manifest.
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// An upstream manifest response whose body has not been read yet.
#[derive(Debug)]
pub struct ProxiedStream {
    response: Response,
}

impl ProxiedStream {
    /// Upstream `Content-Length`, if it sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// The body as a stream of chunks, read lazily from the upstream.
    pub fn into_bytes_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        self.response.bytes_stream()
    }
}

/// Outbound side of the proxy.
#[derive(Debug, Clone)]
pub struct StreamProxy {
    client: Client,
    timeout: Duration,
}

impl StreamProxy {
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_nodelay(true)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Open `manifest_url`, sending `page_url` as the referer.
    ///
    /// The timeout covers the response head only; the body may stream for
    /// as long as the upstream keeps sending. Non-2xx status is a failure.
    #[instrument(skip(self), fields(manifest_url = %manifest_url))]
    pub async fn open(&self, manifest_url: &str, page_url: &str) -> Result<ProxiedStream, ProxyError> {
        let request = self
            .client
            .get(manifest_url)
            .header(REFERER, page_url)
            .header(USER_AGENT, PROXY_USER_AGENT)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Status(status));
        }

        debug!(%status, content_length = ?response.content_length(), "Upstream manifest opened");
        Ok(ProxiedStream { response })
    }
}
