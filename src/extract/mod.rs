//! Manifest extraction tiers.
//!
//! # Architecture
//!
//! - [`Resolver`]: one way of turning a page URL into a manifest URL
//! - [`ResolverChain`]: tries resolvers in registration order, first hit wins
//! - [`FastExtractor`]: static HTML pattern matching (milliseconds)
//! - [`RenderedExtractor`]: headless browser network capture (seconds)
//!
//! A resolver never fails: transport errors, timeouts and browser crashes
//! are logged inside the tier and reported as `None`, which simply moves
//! the chain on to the next tier.

pub mod fast;
pub mod rendered;

use async_trait::async_trait;
use tracing::{debug, info};

pub use fast::{extract_manifest, FastExtractor};
pub use rendered::RenderedExtractor;

/// Marker that identifies an HLS manifest URL.
pub const MANIFEST_MARKER: &str = ".m3u8";

/// A manifest URL together with the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub manifest_url: String,
    pub tier: &'static str,
}

/// One extraction strategy.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short lowercase tier name (e.g., `"fast"`, `"rendered"`).
    fn name(&self) -> &'static str;

    /// Try to find the manifest URL embedded in `page_url`.
    async fn attempt(&self, page_url: &str) -> Option<String>;
}

/// Ordered list of resolvers.
///
/// Resolvers are tried in registration order and the first one to return
/// a URL wins; later resolvers are not invoked.
pub struct ResolverChain {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl ResolverChain {
    #[must_use]
    pub fn new(resolvers: Vec<Box<dyn Resolver>>) -> Self {
        Self { resolvers }
    }

    /// Tier names in the order they are tried.
    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Run the chain. Returns `None` once every tier has come back empty.
    pub async fn resolve(&self, page_url: &str) -> Option<Resolution> {
        for resolver in &self.resolvers {
            debug!(tier = resolver.name(), page_url, "Trying tier");
            if let Some(manifest_url) = resolver.attempt(page_url).await {
                info!(tier = resolver.name(), %manifest_url, "Manifest resolved");
                return Some(Resolution {
                    manifest_url,
                    tier: resolver.name(),
                });
            }
            info!(tier = resolver.name(), page_url, "Tier found nothing, falling through");
        }
        None
    }
}
