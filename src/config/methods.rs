//! Validation and routing predicates for `FetchOptions`

use crate::error::{FetchError, Result};
use crate::url_safety::{validate_headers, validate_user_agent};
use crate::utils::constants::{MAX_TIMEOUT_MS, MAX_WAIT_MS, MIN_TIMEOUT_MS};

use super::types::{Cookie, Device, FetchOptions, PageAction, ResourceType};

impl FetchOptions {
    /// Check every caller-controlled value.
    ///
    /// # Errors
    /// `FetchError::Security` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(FetchError::security(format!(
                "timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}, got {}",
                self.timeout_ms
            )));
        }
        if self.wait_ms > MAX_WAIT_MS {
            return Err(FetchError::security(format!(
                "wait_ms must be at most {MAX_WAIT_MS}, got {}",
                self.wait_ms
            )));
        }
        if let Some(ua) = &self.user_agent {
            validate_user_agent(ua)?;
        }
        validate_headers(&self.headers)?;

        for cookie in self.cookies.iter().chain(self.storage_state.iter().flatten()) {
            validate_cookie(cookie)?;
        }
        for action in &self.actions {
            validate_action(action)?;
        }
        if let Some(selector) = &self.wait_selector {
            validate_selector(selector)?;
        }
        if let Some(proxy) = &self.proxy {
            validate_proxy(proxy)?;
            if self.profile_dir.is_some() {
                return Err(FetchError::security(
                    "proxy cannot be combined with profile_dir",
                ));
            }
        }
        if let Some(dir) = &self.profile_dir {
            if dir.as_os_str().is_empty() {
                return Err(FetchError::security("profile_dir must not be empty"));
            }
        }
        Ok(())
    }

    /// Whether the direct engine must be skipped.
    ///
    /// Proxy, cookies and extra headers are only honoured by the browser.
    #[must_use]
    pub fn requires_browser(&self) -> bool {
        self.render
            || self.stealth
            || !self.actions.is_empty()
            || self.screenshot
            || self.wait_selector.is_some()
            || self.keep_page_open
            || self.profile_dir.is_some()
            || self.proxy.is_some()
            || !self.cookies.is_empty()
            || self.storage_state.is_some()
            || !self.headers.is_empty()
    }

    /// Whether the response is a pure function of the URL and may be cached
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.actions.is_empty()
            && !self.screenshot
            && self.cookies.is_empty()
            && self.headers.is_empty()
            && self.profile_dir.is_none()
            && self.storage_state.is_none()
            && !self.keep_page_open
    }

    /// Whether a pre-warmed page from the shared pool may serve this fetch.
    ///
    /// Pooled pages live in the default browser context, so anything that
    /// would leave state behind on them (cookies, a custom identity) opts out.
    #[must_use]
    pub fn uses_shared_pool(&self) -> bool {
        self.user_agent.is_none()
            && self.device == Device::Desktop
            && !self.stealth
            && self.profile_dir.is_none()
            && self.storage_state.is_none()
            && self.proxy.is_none()
            && self.cookies.is_empty()
            && self.headers.is_empty()
            && !self.keep_page_open
    }

    /// Whether the page needs its own browser context
    #[must_use]
    pub fn needs_isolated_context(&self) -> bool {
        self.profile_dir.is_none()
            && (self.proxy.is_some() || self.storage_state.is_some() || !self.cookies.is_empty())
    }

    /// Resource types to refuse for this fetch
    #[must_use]
    pub fn blocked_resources(&self) -> Vec<ResourceType> {
        match &self.block_resources {
            Some(list) => list.clone(),
            None if self.screenshot || self.stealth => Vec::new(),
            None => ResourceType::DEFAULT_BLOCKED.to_vec(),
        }
    }

    /// User agent to present: explicit override, then the device's, then none
    #[must_use]
    pub fn effective_user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref().or_else(|| self.device.user_agent())
    }

    /// Copy with a longer settle delay, used for the Cloudflare retry
    #[must_use]
    pub fn with_settle_wait(&self, wait_ms: u64) -> Self {
        let mut next = self.clone();
        next.wait_ms = next.wait_ms.max(wait_ms);
        next
    }
}

fn validate_cookie(cookie: &Cookie) -> Result<()> {
    let bad = |s: &str| s.chars().any(|c| c.is_control() || c == ';');
    if cookie.name.is_empty() || bad(&cookie.name) || cookie.name.contains('=') {
        return Err(FetchError::security(format!(
            "Invalid cookie name: {:?}",
            cookie.name
        )));
    }
    if bad(&cookie.value) {
        return Err(FetchError::security(format!(
            "Cookie '{}' has an invalid value",
            cookie.name
        )));
    }
    Ok(())
}

fn validate_selector(selector: &str) -> Result<()> {
    if selector.trim().is_empty() {
        return Err(FetchError::security("Selector must not be empty"));
    }
    if selector.chars().any(char::is_control) {
        return Err(FetchError::security("Selector contains control characters"));
    }
    Ok(())
}

fn validate_action(action: &PageAction) -> Result<()> {
    match action {
        PageAction::Click { selector }
        | PageAction::WaitForSelector { selector }
        | PageAction::Type { selector, .. } => validate_selector(selector),
        PageAction::Press { key } if key.is_empty() => {
            Err(FetchError::security("Press action needs a key"))
        }
        PageAction::Wait { ms } if *ms > MAX_WAIT_MS => Err(FetchError::security(format!(
            "Wait action must be at most {MAX_WAIT_MS} ms"
        ))),
        _ => Ok(()),
    }
}

fn validate_proxy(proxy: &str) -> Result<()> {
    let url = url::Url::parse(proxy)
        .map_err(|e| FetchError::security(format!("Invalid proxy URL: {e}")))?;
    match url.scheme() {
        "http" | "https" | "socks5" | "socks4" => {}
        other => {
            return Err(FetchError::security(format!(
                "Unsupported proxy scheme: {other}"
            )));
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(FetchError::security("Proxy URL has no host"));
    }
    Ok(())
}
