//! Resolution pipeline: cache → fast → rendered → store → proxy.
//!
//! ```text
//! CACHE_CHECK ──hit──▶ PROXY_CACHED ──ok──▶ done
//!      │                    │ fail: evict
//!      ▼ miss               ▼
//! FAST_EXTRACT ──none──▶ RENDER_EXTRACT ──none──▶ FAIL
//!      │ found                 │ found
//!      ▼                       ▼
//!         STORE_AND_PROXY ──fail──▶ error (no further fallback)
//! ```
//!
//! A failing cached URL is retried through extraction exactly once; the
//! pipeline never loops back to the cache check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::extract::{FastExtractor, RenderedExtractor, Resolution, Resolver, ResolverChain};
use crate::http_client::AcceleratedClient;
use crate::proxy::{ProxiedStream, StreamProxy};

/// Tier name reported for answers served from the cache.
pub const CACHE_TIER: &str = "cache";

/// Per-key async locks, dropped from the map once nobody holds them.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        KeyGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own reference left: no holder, no waiter
        if locks.get(&self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Resolves page URLs to manifests and opens them for relaying.
pub struct StreamResolver {
    cache: TtlCache,
    chain: ResolverChain,
    proxy: StreamProxy,
    inflight: KeyLocks,
}

impl StreamResolver {
    #[must_use]
    pub fn new(cache: TtlCache, chain: ResolverChain, proxy: StreamProxy) -> Self {
        Self {
            cache,
            chain,
            proxy,
            inflight: KeyLocks::default(),
        }
    }

    /// Build the standard pipeline (fast tier, then rendered tier) from
    /// configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let fast = FastExtractor::new(AcceleratedClient::new()?, config.fast.timeout());
        let rendered = RenderedExtractor::new(config.render.clone());
        let resolvers: Vec<Box<dyn Resolver>> = vec![Box::new(fast), Box::new(rendered)];

        Ok(Self::new(
            TtlCache::new(config.cache.ttl()),
            ResolverChain::new(resolvers),
            StreamProxy::new(config.proxy.timeout())?,
        ))
    }

    #[must_use]
    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    #[must_use]
    pub fn chain(&self) -> &ResolverChain {
        &self.chain
    }

    /// Resolve `page_url` and open its manifest for streaming.
    pub async fn stream(self: &Arc<Self>, page_url: &str) -> Result<(Resolution, ProxiedStream)> {
        if let Some(cached) = self.cache.get(page_url) {
            info!(page_url, manifest_url = %cached, "Using cached manifest");
            match self.proxy.open(&cached, page_url).await {
                Ok(stream) => {
                    let resolution = Resolution {
                        manifest_url: cached,
                        tier: CACHE_TIER,
                    };
                    return Ok((resolution, stream));
                }
                Err(e) => {
                    self.cache.delete(page_url);
                    warn!(page_url, error = %e, "Cached manifest failed, evicted");
                }
            }
        }

        let resolution = self.extract(page_url).await?;
        let stream = self
            .proxy
            .open(&resolution.manifest_url, page_url)
            .await
            .inspect_err(|e| warn!(page_url, error = %e, "Error proxying fresh manifest"))?;
        Ok((resolution, stream))
    }

    /// Resolve `page_url` without opening the manifest.
    pub async fn resolve(self: &Arc<Self>, page_url: &str) -> Result<Resolution> {
        if let Some(cached) = self.cache.get(page_url) {
            return Ok(Resolution {
                manifest_url: cached,
                tier: CACHE_TIER,
            });
        }
        self.extract(page_url).await
    }

    /// Run the extraction chain on a detached task.
    ///
    /// The task outlives the caller: if the client goes away mid-way the
    /// browser still finishes and the result still reaches the cache.
    async fn extract(self: &Arc<Self>, page_url: &str) -> Result<Resolution> {
        let this = Arc::clone(self);
        let key = page_url.to_string();
        let task = tokio::spawn(async move { this.extract_and_store(&key).await });

        let resolution = match task.await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(page_url, error = %e, "Extraction task aborted");
                None
            }
        };
        resolution.ok_or_else(|| StreamError::ResolutionExhausted(page_url.to_string()))
    }

    async fn extract_and_store(&self, page_url: &str) -> Option<Resolution> {
        let _flight = self.inflight.acquire(page_url).await;

        // Someone resolved the same page while this request waited
        if let Some(cached) = self.cache.get(page_url) {
            return Some(Resolution {
                manifest_url: cached,
                tier: CACHE_TIER,
            });
        }

        let Some(resolution) = self.chain.resolve(page_url).await else {
            warn!(page_url, "All extraction tiers exhausted");
            return None;
        };

        self.cache.set(page_url, &resolution.manifest_url);
        info!(
            page_url,
            manifest_url = %resolution.manifest_url,
            tier = resolution.tier,
            "Manifest resolved and cached"
        );
        Some(resolution)
    }
}
