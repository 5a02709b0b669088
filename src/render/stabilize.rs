//! Post-load settling for rendered pages
//!
//! Two stages. A page with little text first gets a bounded wait for the
//! network to go quiet. Then the rendered text length is polled until it
//! stops changing or the settle cap is reached, so hydrating apps finish
//! without every fetch paying a fixed worst-case sleep.

use anyhow::Result;
use chromiumoxide::Page;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::config::StabilizationConfig;

const TEXT_LENGTH_JS: &str = "document.body ? document.body.innerText.length : 0";
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";

/// Resource-count polling cadence while waiting for network idle
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Counts consecutive unchanged samples of a growing value
#[derive(Debug)]
pub(crate) struct StabilityTracker {
    last: Option<usize>,
    unchanged: u32,
    needed: u32,
}

impl StabilityTracker {
    pub(crate) fn new(needed: u32) -> Self {
        Self {
            last: None,
            unchanged: 0,
            needed: needed.max(1),
        }
    }

    /// Record a sample; true once it has held steady for `needed` samples in a row
    pub(crate) fn observe(&mut self, value: usize) -> bool {
        match self.last {
            Some(last) if last == value => self.unchanged += 1,
            _ => {
                self.last = Some(value);
                self.unchanged = 0;
            }
        }
        self.unchanged >= self.needed
    }
}

pub(crate) async fn text_length(page: &Page) -> Result<usize> {
    Ok(page.evaluate(TEXT_LENGTH_JS).await?.into_value::<usize>()?)
}

/// Wait until no new resources start loading for two polls, or `limit` passes
pub(crate) async fn wait_for_network_idle(page: &Page, limit: Duration) {
    let deadline = Instant::now() + limit;
    let mut tracker = StabilityTracker::new(2);

    while Instant::now() < deadline {
        let count = match page.evaluate(RESOURCE_COUNT_JS).await {
            Ok(value) => value.into_value::<usize>().unwrap_or(0),
            Err(e) => {
                trace!("Resource count unavailable: {e}");
                return;
            }
        };
        if tracker.observe(count) {
            trace!("Network idle at {count} resources");
            return;
        }
        sleep(IDLE_POLL).await;
    }
    debug!("Network idle wait hit its {}ms limit", limit.as_millis());
}

/// Run both settle stages on a freshly loaded page
pub(crate) async fn stabilize(page: &Page, config: &StabilizationConfig) -> Result<()> {
    let initial = text_length(page).await?;
    if initial < config.short_content_chars {
        wait_for_network_idle(page, config.network_idle_timeout).await;
    }

    let started = Instant::now();
    let mut tracker = StabilityTracker::new(config.stable_polls);
    tracker.observe(text_length(page).await?);

    while started.elapsed() < config.max_settle {
        sleep(config.poll_interval).await;
        let length = text_length(page).await?;
        if tracker.observe(length) {
            debug!(
                "Content stable at {length} chars after {}ms",
                started.elapsed().as_millis()
            );
            return Ok(());
        }
    }

    debug!("Content still changing after {}ms, extracting anyway", config.max_settle.as_millis());
    Ok(())
}

/// Poll for `selector` until it exists; the caller's deadline bounds the wait
pub(crate) async fn wait_for_selector(page: &Page, selector: &str, interval: Duration) {
    loop {
        if page.find_element(selector).await.is_ok() {
            return;
        }
        sleep(interval).await;
    }
}
