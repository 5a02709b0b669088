//! `FetchEngine`: the single entry point tying validation, cache, strategy
//! and the browser pool together

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser_pool::BrowserPool;
use crate::cache::{CachedFetch, ResponseCache};
use crate::config::{EngineConfig, FetchOptions};
use crate::direct_fetch::DirectFetcher;
use crate::error::Result;
use crate::fetch_types::{FetchMethod, FetchResult};
use crate::render::{BrowserFetcher, KeptPage};
use crate::strategy::Escalation;
use crate::url_safety::validate_url;

/// Successful fetch as seen by callers
#[derive(Debug)]
pub struct FetchResponse {
    pub result: FetchResult,
    /// Tier that produced the result (for cache hits, the original tier)
    pub method: FetchMethod,
    pub elapsed: Duration,
    pub cached: bool,
    /// Live page, only with `keep_page_open`
    pub page: Option<KeptPage>,
}

#[derive(Debug)]
pub struct FetchEngine {
    strategy: Escalation<DirectFetcher, BrowserFetcher>,
    cache: Arc<ResponseCache>,
    pool: Arc<BrowserPool>,
}

impl FetchEngine {
    /// Build the engine. Browsers launch lazily on the first rendered fetch.
    ///
    /// # Errors
    /// `Network` if the HTTP client cannot be constructed.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let pool = Arc::new(BrowserPool::new(&config));
        let direct = DirectFetcher::new()?;
        let rendered = BrowserFetcher::new(Arc::clone(&pool), config.stabilization);

        let cache = ResponseCache::new(config.cache_capacity, config.cache_ttl);
        let cache = Arc::new(attach_shared_tier(cache, &config));

        info!(
            "Fetch engine ready (max {} pages, pool of {}, shared cache {})",
            config.max_concurrent_pages,
            config.page_pool_size,
            if cache.has_shared_tier() { "on" } else { "off" }
        );

        Ok(Self {
            strategy: Escalation::new(direct, rendered, config.retry),
            cache,
            pool,
        })
    }

    /// Engine configured from the environment (see [`EngineConfig::from_env`])
    ///
    /// # Errors
    /// See [`FetchEngine::new`].
    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env())
    }

    /// Fetch `url` with no way to cancel other than dropping the future
    ///
    /// # Errors
    /// See [`FetchEngine::fetch_with_cancel`].
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        self.fetch_with_cancel(url, options, CancellationToken::new())
            .await
    }

    /// Validate, consult the cache, run the escalation strategy, store the result.
    ///
    /// # Errors
    /// One typed [`crate::FetchError`] per request: the validation failure,
    /// or the error of the last tier attempted.
    pub async fn fetch_with_cancel(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: CancellationToken,
    ) -> Result<FetchResponse> {
        let started = Instant::now();
        validate_url(url)?;
        options.validate()?;

        let cacheable = options.is_cacheable();
        if cacheable {
            if let Some(hit) = self.cache.get_async(url).await {
                debug!("Cache hit for {url}");
                return Ok(FetchResponse {
                    result: hit.result,
                    method: hit.method,
                    elapsed: started.elapsed(),
                    cached: true,
                    page: None,
                });
            }
        }

        let outcome = self.strategy.run(url, options, &cancel).await?;

        if cacheable {
            self.cache
                .set(
                    url,
                    CachedFetch {
                        result: outcome.result.clone(),
                        method: outcome.method,
                    },
                )
                .await;
        }

        let elapsed = started.elapsed();
        info!("Fetched {url} via {} in {}ms", outcome.method, elapsed.as_millis());
        Ok(FetchResponse {
            result: outcome.result,
            method: outcome.method,
            elapsed,
            cached: false,
            page: outcome.page,
        })
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }

    /// Close pooled pages and every browser. Call before process exit.
    pub async fn cleanup(&self) {
        self.pool.shutdown().await;
    }
}

#[cfg(feature = "redis-backend")]
fn attach_shared_tier(cache: ResponseCache, config: &EngineConfig) -> ResponseCache {
    use crate::cache::{RedisCache, SharedCache};

    let Some(url) = config.shared_cache_url.as_deref() else {
        return cache;
    };
    match RedisCache::new(url, config.shared_cache_ttl) {
        Ok(redis) => cache.with_shared(Arc::new(redis) as Arc<dyn SharedCache>),
        Err(e) => {
            warn!("Shared cache disabled, bad connection string: {e}");
            cache
        }
    }
}

#[cfg(not(feature = "redis-backend"))]
fn attach_shared_tier(cache: ResponseCache, config: &EngineConfig) -> ResponseCache {
    if config.shared_cache_url.is_some() {
        warn!("Shared cache configured but the redis-backend feature is disabled");
    }
    cache
}
