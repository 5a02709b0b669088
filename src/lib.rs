pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod cache;
pub mod challenge;
pub mod config;
pub mod direct_fetch;
pub mod engine;
pub mod error;
pub mod fetch_types;
pub mod render;
pub mod stealth;
pub mod strategy;
pub mod url_safety;
pub mod utils;

pub use browser_pool::{BrowserPool, PageSlot};
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use cache::{CachedFetch, ResponseCache, SharedCache, cache_key, normalize_url};
#[cfg(feature = "redis-backend")]
pub use cache::RedisCache;
pub use challenge::{ChallengeDetection, ChallengeKind, detect_challenge};
pub use config::{
    Cookie, Device, EngineConfig, FetchOptions, FetchOptionsBuilder, PageAction, ResourceType,
    RetryPolicy, StabilizationConfig,
};
pub use direct_fetch::DirectFetcher;
pub use engine::{FetchEngine, FetchResponse};
pub use error::{ErrorKind, FetchError, Result};
pub use fetch_types::{FetchBody, FetchMethod, FetchResult};
pub use render::{BrowserFetcher, KeptPage, RenderOutput};
pub use strategy::{Escalation, RenderedFetch, SimpleFetch, StrategyOutcome, with_retry};
pub use url_safety::{validate_headers, validate_url, validate_user_agent};

/// Fetch `url` with a throwaway engine configured from the environment.
///
/// Browsers are shut down before returning, so a page kept with
/// `keep_page_open` is closed here too. Long-running callers should hold a
/// [`FetchEngine`] so the browser pool and cache survive between requests.
///
/// # Errors
/// See [`FetchEngine::fetch_with_cancel`].
pub async fn fetch(url: &str, options: &FetchOptions) -> Result<FetchResponse> {
    let engine = FetchEngine::from_env()?;
    let mut outcome = engine.fetch(url, options).await;
    if let Ok(response) = &mut outcome {
        if let Some(page) = response.page.take() {
            page.close().await;
        }
    }
    engine.cleanup().await;
    outcome
}
