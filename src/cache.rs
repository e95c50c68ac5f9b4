//! Time-bounded manifest cache.
//!
//! Maps a page URL (used verbatim, no normalization) to the manifest URL it
//! resolved to. Expiry is lazy: a stale entry is only removed when it is
//! read. There is no size bound and no background sweep.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Default lifetime of a cached manifest URL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    created_at: Instant,
}

/// In-memory cache with lazy TTL expiry.
///
/// All operations go through one mutex; it is never held across an await.
#[derive(Debug)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl TtlCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or overwrite `key`, stamping it with the current time.
    pub fn set(&self, key: &str, value: &str) {
        self.lock().insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                created_at: Instant::now(),
            },
        );
    }

    /// Look up `key`, evicting it if it has outlived the TTL.
    ///
    /// Reading does not refresh the timestamp.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.created_at.elapsed() > self.ttl {
            debug!(key, "cache entry expired");
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Drop `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Number of stored entries, including stale ones not yet read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // The map holds plain data; a panic mid-insert cannot leave it torn.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
