//! Fluent builder for `FetchOptions`
//!
//! Defaults are resolved once here; `build()` validates the whole set so a
//! constructed `FetchOptions` is always usable.

use std::path::PathBuf;

use crate::error::Result;

use super::types::{Cookie, Device, FetchOptions, PageAction, ResourceType};

#[derive(Debug, Clone, Default)]
pub struct FetchOptionsBuilder {
    options: FetchOptions,
}

impl FetchOptions {
    /// Create a builder for configuring `FetchOptions` with a fluent interface
    #[must_use]
    pub fn builder() -> FetchOptionsBuilder {
        FetchOptionsBuilder::default()
    }
}

impl FetchOptionsBuilder {
    #[must_use]
    pub fn render(mut self, render: bool) -> Self {
        self.options.render = render;
        self
    }

    #[must_use]
    pub fn stealth(mut self, stealth: bool) -> Self {
        self.options.stealth = stealth;
        self
    }

    #[must_use]
    pub fn wait_ms(mut self, ms: u64) -> Self {
        self.options.wait_ms = ms;
        self
    }

    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.options.timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.options.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.options.cookies.push(cookie);
        self
    }

    #[must_use]
    pub fn action(mut self, action: PageAction) -> Self {
        self.options.actions.push(action);
        self
    }

    #[must_use]
    pub fn actions(mut self, actions: impl IntoIterator<Item = PageAction>) -> Self {
        self.options.actions.extend(actions);
        self
    }

    /// Capture a PNG of the rendered page
    #[must_use]
    pub fn screenshot(mut self, screenshot: bool) -> Self {
        self.options.screenshot = screenshot;
        self
    }

    /// Extend the screenshot beyond the viewport; no effect without `screenshot(true)`
    #[must_use]
    pub fn screenshot_full_page(mut self, full_page: bool) -> Self {
        self.options.screenshot_full_page = full_page;
        self
    }

    #[must_use]
    pub fn device(mut self, device: Device) -> Self {
        self.options.device = device;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.options.proxy = Some(proxy.into());
        self
    }

    /// Replace the default resource-blocking policy; an empty list blocks nothing
    #[must_use]
    pub fn block_resources(mut self, types: impl IntoIterator<Item = ResourceType>) -> Self {
        self.options.block_resources = Some(types.into_iter().collect());
        self
    }

    #[must_use]
    pub fn wait_selector(mut self, selector: impl Into<String>) -> Self {
        self.options.wait_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn keep_page_open(mut self, keep: bool) -> Self {
        self.options.keep_page_open = keep;
        self
    }

    #[must_use]
    pub fn profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.profile_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn headed(mut self, headed: bool) -> Self {
        self.options.headed = headed;
        self
    }

    #[must_use]
    pub fn storage_state(mut self, cookies: Vec<Cookie>) -> Self {
        self.options.storage_state = Some(cookies);
        self
    }

    /// Validate and produce the options
    ///
    /// # Errors
    /// `FetchError::Security` for any out-of-range or malformed value.
    pub fn build(self) -> Result<FetchOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
