//! `streamtap` - HLS manifest resolver and proxy
//!
//! Turns the URL of a third-party video embed page into the manifest
//! (`.m3u8`) it plays, and relays that manifest to the caller.
//!
//! # Features
//!
//! - **Tiered extraction**: static HTML pattern matching first, a headless
//!   Chromium network capture only when that fails
//! - **TTL cache**: resolved manifests are reused for five minutes, and a
//!   cached URL that stops serving is evicted and re-resolved
//! - **Streaming relay**: manifests are proxied chunk by chunk with the
//!   referer the upstream expects
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streamtap::{Config, StreamResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Arc::new(StreamResolver::from_config(&Config::default())?);
//!     let resolution = resolver.resolve("https://host.example/embed/abc").await?;
//!     println!("{} ({})", resolution.manifest_url, resolution.tier);
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod http_client;
pub mod proxy;
pub mod resolve;
pub mod web;

#[cfg(test)]
mod test_support;

pub use cache::TtlCache;
pub use config::Config;
pub use error::{ProxyError, StreamError};
pub use extract::{FastExtractor, RenderedExtractor, Resolution, Resolver, ResolverChain};
pub use http_client::AcceleratedClient;
pub use proxy::{ProxiedStream, StreamProxy, MANIFEST_CONTENT_TYPE};
pub use resolve::StreamResolver;
pub use web::{router, AppState};

/// Version of streamtap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
