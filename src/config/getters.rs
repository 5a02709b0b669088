//! Accessors for `FetchOptions`

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::types::{Cookie, Device, FetchOptions, PageAction};

impl FetchOptions {
    #[must_use]
    pub fn render(&self) -> bool {
        self.render
    }

    #[must_use]
    pub fn stealth(&self) -> bool {
        self.stealth
    }

    #[must_use]
    pub fn wait_ms(&self) -> u64 {
        self.wait_ms
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Per-attempt budget as a `Duration`
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    #[must_use]
    pub fn actions(&self) -> &[PageAction] {
        &self.actions
    }

    #[must_use]
    pub fn screenshot(&self) -> bool {
        self.screenshot
    }

    #[must_use]
    pub fn screenshot_full_page(&self) -> bool {
        self.screenshot_full_page
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub fn wait_selector(&self) -> Option<&str> {
        self.wait_selector.as_deref()
    }

    #[must_use]
    pub fn keep_page_open(&self) -> bool {
        self.keep_page_open
    }

    #[must_use]
    pub fn profile_dir(&self) -> Option<&Path> {
        self.profile_dir.as_deref()
    }

    #[must_use]
    pub fn headed(&self) -> bool {
        self.headed
    }

    #[must_use]
    pub fn storage_state(&self) -> Option<&[Cookie]> {
        self.storage_state.as_deref()
    }
}
