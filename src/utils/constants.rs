//! Shared configuration constants for webfetch
//!
//! Default values used throughout the codebase to keep the policy knobs in
//! one place and avoid magic numbers.

use std::time::Duration;

/// Maximum accepted URL length in characters
pub const MAX_URL_LENGTH: usize = 2048;

/// Maximum length of a caller-supplied user agent
pub const MAX_USER_AGENT_LENGTH: usize = 500;

/// Maximum length of a caller-supplied header value
pub const MAX_HEADER_VALUE_LENGTH: usize = 500;

/// Redirect hops followed by the direct fetch engine before giving up
pub const MAX_REDIRECTS: usize = 10;

/// Hard cap on a streamed response body: 10 MB
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Bodies shorter than this are treated as interstitials, not content
pub const MIN_CONTENT_BYTES: usize = 100;

/// Default per-attempt budget
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Accepted range for `timeout_ms`
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;

/// Upper bound for the post-load settle delay
pub const MAX_WAIT_MS: u64 = 60_000;

/// Global ceiling on concurrently active rendered fetches
pub const MAX_CONCURRENT_PAGES: usize = 5;

/// Pre-warmed pages kept in the shared pool
pub const PAGE_POOL_SIZE: usize = 3;

/// How long a rendered fetch may wait for admission
pub const QUEUE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tier-1 cache capacity
pub const CACHE_MAX_ENTRIES: usize = 1000;

/// Tier-1 cache TTL: 5 minutes
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Tier-2 cache TTL: 15 minutes
pub const SHARED_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Tier-2 is skipped for this long after any operational error
pub const SHARED_CACHE_COOLDOWN: Duration = Duration::from_secs(30);

/// Tier-2 connect timeout
pub const SHARED_CACHE_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Environment variable holding the tier-2 connection string
pub const SHARED_CACHE_URL_ENV: &str = "REDIS_URL";

/// Settle wait used for the one extra rendered attempt after a Cloudflare-style reset
pub const CLOUDFLARE_RETRY_WAIT_MS: u64 = 5_000;

/// Chrome user agent string for the launched browsers
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
/// Next update: 2025-04-29 (quarterly schedule)
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Realistic desktop user agents rotated by the direct fetch engine
pub const DESKTOP_USER_AGENTS: &[&str] = &[
    CHROME_USER_AGENT,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// User agent presented by the `mobile` device profile
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 18_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Mobile/15E148 Safari/604.1";

/// User agent presented by the `tablet` device profile
pub const TABLET_USER_AGENT: &str = "Mozilla/5.0 (iPad; CPU OS 18_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Mobile/15E148 Safari/604.1";

/// Pick a realistic desktop user agent at random
#[must_use]
pub fn random_user_agent() -> &'static str {
    use rand::seq::IndexedRandom;
    DESKTOP_USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(CHROME_USER_AGENT)
}
