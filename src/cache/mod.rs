//! Result cache
//!
//! Process-wide store of prior fetch results keyed by canonical URL. Entries
//! carry an absolute expiry and are evicted lazily on lookup; there is no
//! background sweeper.

mod flight;

pub use flight::SingleFlight;

use crate::model::FetchResult;
use crate::url::canonicalize_url;
use crate::UrlError;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// A cached result with its absolute expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: FetchResult,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Builds the cache key for a request URL
///
/// Headers and extraction rules are deliberately absent: two requests that only
/// differ in rules share one cached raw fetch.
pub fn cache_key(url: &str) -> Result<String, UrlError> {
    canonicalize_url(url).map(String::from)
}

/// Concurrent TTL cache of fetch results
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl ResultCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Returns the cached result, or `None` on miss or expiry
    ///
    /// An expired entry found here is removed.
    pub fn get(&self, key: &str) -> Option<FetchResult> {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.result.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            tracing::debug!("Evicted expired cache entry for {}", key);
        }

        None
    }

    /// Stores a result for `ttl`
    pub fn put(&self, key: impl Into<String>, result: FetchResult, ttl: Duration) {
        let entry = CacheEntry {
            result,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Stores a result for the default TTL
    pub fn insert(&self, key: impl Into<String>, result: FetchResult) {
        self.put(key, result, self.default_ttl);
    }

    pub fn remove(&self, key: &str) -> Option<FetchResult> {
        self.entries.remove(key).map(|(_, entry)| entry.result)
    }

    /// Number of stored entries, including expired ones not yet looked up
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}
