//! Service-level configuration for `FetchEngine`

use std::time::Duration;

use tracing::warn;

use crate::utils::constants::{
    CACHE_MAX_ENTRIES, CACHE_TTL, MAX_CONCURRENT_PAGES, PAGE_POOL_SIZE, QUEUE_TIMEOUT,
    SHARED_CACHE_TTL, SHARED_CACHE_URL_ENV,
};

/// Limits and tuning shared by every fetch an engine serves
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global ceiling on concurrently active rendered fetches
    pub max_concurrent_pages: usize,
    /// Pre-warmed pages kept in the shared pool
    pub page_pool_size: usize,
    /// Bound on the admission wait, not charged to the fetch timeout
    pub queue_timeout: Duration,
    /// Headless mode for the default and stealth browsers
    pub headless: bool,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Tier-2 cache connection string; `None` disables tier 2
    pub shared_cache_url: Option<String>,
    pub shared_cache_ttl: Duration,
    pub retry: RetryPolicy,
    pub stabilization: StabilizationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pages: MAX_CONCURRENT_PAGES,
            page_pool_size: PAGE_POOL_SIZE,
            queue_timeout: QUEUE_TIMEOUT,
            headless: true,
            cache_capacity: CACHE_MAX_ENTRIES,
            cache_ttl: CACHE_TTL,
            shared_cache_url: None,
            shared_cache_ttl: SHARED_CACHE_TTL,
            retry: RetryPolicy::default(),
            stabilization: StabilizationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `REDIS_URL`, `WEBFETCH_MAX_CONCURRENT_PAGES`
    /// and `WEBFETCH_PAGE_POOL_SIZE`. Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.shared_cache_url = lookup(SHARED_CACHE_URL_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(n) = parse_positive(&lookup, "WEBFETCH_MAX_CONCURRENT_PAGES") {
            config.max_concurrent_pages = n;
        }
        if let Some(n) = parse_count(&lookup, "WEBFETCH_PAGE_POOL_SIZE") {
            config.page_pool_size = n;
        }
        config
    }

    #[must_use]
    pub fn with_max_concurrent_pages(mut self, n: usize) -> Self {
        self.max_concurrent_pages = n.max(1);
        self
    }

    #[must_use]
    pub fn with_page_pool_size(mut self, n: usize) -> Self {
        self.page_pool_size = n;
        self
    }

    #[must_use]
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_shared_cache_url(mut self, url: impl Into<String>) -> Self {
        self.shared_cache_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_stabilization(mut self, stabilization: StabilizationConfig) -> Self {
        self.stabilization = stabilization;
        self
    }
}

fn parse_count(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    match parse_count(lookup, key) {
        Some(0) => {
            warn!("Ignoring {key}=0: must be at least 1");
            None
        }
        other => other,
    }
}

/// Backoff policy for the direct tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after `attempt` (zero-based): `base × 2^attempt`
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Constants for post-load DOM settling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizationConfig {
    /// Below this many characters of rendered text, wait for network idle first
    pub short_content_chars: usize,
    pub network_idle_timeout: Duration,
    pub poll_interval: Duration,
    pub max_settle: Duration,
    /// Consecutive unchanged polls that count as stable
    pub stable_polls: u32,
    /// Random pre-extraction delay range for stealth fetches, in ms
    pub stealth_jitter_ms: (u64, u64),
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            short_content_chars: 500,
            network_idle_timeout: Duration::from_millis(1_500),
            poll_interval: Duration::from_millis(500),
            max_settle: Duration::from_secs(3),
            stable_polls: 2,
            stealth_jitter_ms: (200, 800),
        }
    }
}
