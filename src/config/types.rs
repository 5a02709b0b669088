//! Per-request option types
//!
//! `FetchOptions` is the resolved option struct every fetch receives. It is
//! normally produced by [`FetchOptionsBuilder`](super::FetchOptionsBuilder),
//! whose `build()` runs the same validation the engine repeats at fetch time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    DEFAULT_TIMEOUT_MS, MOBILE_USER_AGENT, TABLET_USER_AGENT,
};

/// Options controlling a single fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Force the rendered engine
    pub(crate) render: bool,
    /// Use the evasion-flavoured browser
    pub(crate) stealth: bool,
    /// Post-load settle delay
    pub(crate) wait_ms: u64,
    /// Per-attempt budget
    pub(crate) timeout_ms: u64,
    pub(crate) user_agent: Option<String>,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) cookies: Vec<Cookie>,
    /// Ordered interactions run after stabilization
    pub(crate) actions: Vec<PageAction>,
    pub(crate) screenshot: bool,
    pub(crate) screenshot_full_page: bool,
    pub(crate) device: Device,
    /// Upstream proxy; forces an isolated browser context
    pub(crate) proxy: Option<String>,
    /// Resource-type denylist. `None` applies the default policy,
    /// `Some(vec![])` disables blocking.
    pub(crate) block_resources: Option<Vec<ResourceType>>,
    pub(crate) wait_selector: Option<String>,
    /// Hand the live page to the caller instead of releasing it
    pub(crate) keep_page_open: bool,
    /// Persistent session directory backing a dedicated browser
    pub(crate) profile_dir: Option<PathBuf>,
    /// Visible window; honoured for profile browsers only
    pub(crate) headed: bool,
    /// Cookies injected into a fresh isolated context before navigation
    pub(crate) storage_state: Option<Vec<Cookie>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            render: false,
            stealth: false,
            wait_ms: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: None,
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            actions: Vec::new(),
            screenshot: false,
            screenshot_full_page: false,
            device: Device::Desktop,
            proxy: None,
            block_resources: None,
            wait_selector: None,
            keep_page_open: false,
            profile_dir: None,
            headed: false,
            storage_state: None,
        }
    }
}

/// Device profile driving viewport and user agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

/// Emulated screen for a [`Device`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: i64,
    pub height: i64,
    pub device_scale_factor: f64,
    pub mobile: bool,
}

impl Device {
    #[must_use]
    pub const fn viewport(self) -> Viewport {
        match self {
            Self::Desktop => Viewport {
                width: 1920,
                height: 1080,
                device_scale_factor: 1.0,
                mobile: false,
            },
            Self::Mobile => Viewport {
                width: 390,
                height: 844,
                device_scale_factor: 3.0,
                mobile: true,
            },
            Self::Tablet => Viewport {
                width: 820,
                height: 1180,
                device_scale_factor: 2.0,
                mobile: true,
            },
        }
    }

    /// User agent implied by the device; desktop keeps the browser's own
    #[must_use]
    pub const fn user_agent(self) -> Option<&'static str> {
        match self {
            Self::Desktop => None,
            Self::Mobile => Some(MOBILE_USER_AGENT),
            Self::Tablet => Some(TABLET_USER_AGENT),
        }
    }
}

/// Cookie to set on the page (or isolated context) before navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            secure: false,
            http_only: false,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// One page interaction, executed in order after the page has settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageAction {
    Click { selector: String },
    Type { selector: String, text: String },
    Press { key: String },
    Wait { ms: u64 },
    WaitForSelector { selector: String },
    Scroll { pixels: i64 },
    ScrollToBottom,
}

/// Resource classes that can be refused during rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Font,
    Media,
    Stylesheet,
    Script,
    Xhr,
    Fetch,
    Websocket,
    Other,
}

impl ResourceType {
    /// Blocked when the caller gives no list and neither stealth nor a screenshot is requested
    pub const DEFAULT_BLOCKED: [Self; 4] = [Self::Image, Self::Font, Self::Media, Self::Stylesheet];
}
