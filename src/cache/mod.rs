//! Two-level response cache
//!
//! Tier 1 is an in-process LRU with a read-time TTL. Tier 2 is an optional
//! shared store consulted only by [`ResponseCache::get_async`]; its hits are
//! promoted into tier 1. Keys are SHA-256 digests of the canonical URL.

mod canonical;
mod shared;

pub use canonical::{cache_key, normalize_url};
#[cfg(feature = "redis-backend")]
pub use shared::RedisCache;
pub use shared::SharedCache;

use log::{debug, trace, warn};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::fetch_types::{FetchMethod, FetchResult};
use crate::utils::constants::{CACHE_MAX_ENTRIES, CACHE_TTL};

/// What is stored per URL: the result and the tier that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFetch {
    pub result: FetchResult,
    pub method: FetchMethod,
}

#[derive(Debug)]
struct Entry {
    value: CachedFetch,
    stored_at: Instant,
}

pub struct ResponseCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: RwLock<Duration>,
    shared: Option<Arc<dyn SharedCache>>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl())
            .field("shared", &self.shared.is_some())
            .finish()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CACHE_MAX_ENTRIES, CACHE_TTL)
    }
}

impl ResponseCache {
    /// Tier-1 only cache; a zero capacity is raised to one
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: RwLock::new(ttl),
            shared: None,
        }
    }

    #[must_use]
    pub fn with_shared(mut self, shared: Arc<dyn SharedCache>) -> Self {
        self.shared = Some(shared);
        self
    }

    #[must_use]
    pub fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    /// Tier-1 lookup. A hit becomes most recently used; an expired entry is
    /// evicted and reported as a miss.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<CachedFetch> {
        self.get_by_key(&cache_key(url))
    }

    fn get_by_key(&self, key: &str) -> Option<CachedFetch> {
        let ttl = self.ttl();
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.stored_at.elapsed() >= ttl,
        };
        if expired {
            entries.pop(key);
            trace!("Cache entry {key} expired");
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Tier 1, then tier 2 (promoting a hit into tier 1)
    pub async fn get_async(&self, url: &str) -> Option<CachedFetch> {
        let key = cache_key(url);
        if let Some(hit) = self.get_by_key(&key) {
            return Some(hit);
        }

        let shared = self.shared.as_ref()?;
        let raw = shared.get(&key).await?;
        match serde_json::from_str::<CachedFetch>(&raw) {
            Ok(value) => {
                debug!("Shared cache hit for {url}, promoting");
                self.insert(key, value.clone());
                Some(value)
            }
            Err(e) => {
                warn!("Discarding undecodable shared cache entry for {url}: {e}");
                None
            }
        }
    }

    /// Store in tier 1 and, when configured, tier 2
    pub async fn set(&self, url: &str, value: CachedFetch) {
        let key = cache_key(url);
        let encoded = self
            .shared
            .as_ref()
            .map(|_| serde_json::to_string(&value));
        self.insert(key.clone(), value);

        if let (Some(shared), Some(encoded)) = (self.shared.as_ref(), encoded) {
            match encoded {
                Ok(json) => shared.set(&key, json).await,
                Err(e) => warn!("Failed to encode cache entry for {url}: {e}"),
            }
        }
    }

    fn insert(&self, key: String, value: CachedFetch) {
        let evicted = self.entries.lock().push(
            key.clone(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
        if let Some((old_key, _)) = evicted {
            if old_key != key {
                trace!("Cache full, evicted {old_key}");
            }
        }
    }

    /// Drop every tier-1 entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Change the tier-1 TTL; applies to entries already stored
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.write() = ttl;
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        *self.ttl.read()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired tier-1 entries; returns how many went
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl();
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Sweep expired entries every `interval` until the cache is dropped.
    ///
    /// Reads already evict expired entries; this only bounds memory held by
    /// entries nobody asks for again.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!("Cache sweep removed {purged} expired entries");
                }
            }
        })
    }
}
