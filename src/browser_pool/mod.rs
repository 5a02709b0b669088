//! Shared Chromium instances, a pre-warmed page pool, and admission control
//!
//! The pool owns at most one default browser, one stealth-flavoured browser,
//! and one dedicated browser per persistent profile directory. Each lives in
//! its own async mutex so concurrent first use launches exactly one process.
//! Every lookup health-checks the instance and relaunches it if it died.

mod admission;
mod wrapper;

pub use admission::{AdmissionGate, PageSlot};
pub use wrapper::BrowserWrapper;

use anyhow::Context;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser_profile::{PROFILE_PREFIX, create_unique_profile, prepare_persistent_profile};
use crate::browser_setup::{LaunchOptions, launch_browser};
use crate::config::EngineConfig;
use crate::error::{FetchError, Result};

/// Budget for resetting a page to `about:blank` before reuse
const RECYCLE_TIMEOUT: Duration = Duration::from_secs(5);

type BrowserSlot = Arc<Mutex<Option<BrowserWrapper>>>;

#[derive(Debug)]
pub struct BrowserPool {
    headless: bool,
    page_pool_size: usize,
    default_browser: Mutex<Option<BrowserWrapper>>,
    stealth_browser: Mutex<Option<BrowserWrapper>>,
    profiles: Mutex<HashMap<PathBuf, BrowserSlot>>,
    /// Idle pre-warmed pages of the default browser
    pages: Mutex<VecDeque<Page>>,
    gate: AdmissionGate,
    closed: AtomicBool,
}

impl BrowserPool {
    /// Create the pool. Nothing is launched until first use.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            headless: config.headless,
            page_pool_size: config.page_pool_size,
            default_browser: Mutex::new(None),
            stealth_browser: Mutex::new(None),
            profiles: Mutex::new(HashMap::new()),
            pages: Mutex::new(VecDeque::new()),
            gate: AdmissionGate::new(config.max_concurrent_pages, config.queue_timeout),
            closed: AtomicBool::new(false),
        }
    }

    /// The shared default browser, launched or relaunched as needed
    pub async fn get_browser(&self) -> Result<Arc<Browser>> {
        let (browser, relaunched) = self.get_singleton(&self.default_browser, false).await?;
        if relaunched {
            // Pages of a dead browser are useless
            let stale = std::mem::take(&mut *self.pages.lock().await);
            if !stale.is_empty() {
                debug!("Discarding {} pooled pages of the previous browser", stale.len());
            }
        }
        Ok(browser)
    }

    /// The shared stealth browser, launched or relaunched as needed
    pub async fn get_stealth_browser(&self) -> Result<Arc<Browser>> {
        self.get_singleton(&self.stealth_browser, true)
            .await
            .map(|(browser, _)| browser)
    }

    /// The dedicated browser for a persistent profile directory.
    ///
    /// Launched once per directory and kept for the life of the pool.
    /// `headed` and `stealth` apply to the first launch only.
    pub async fn get_profile_browser(
        &self,
        dir: &Path,
        headed: bool,
        stealth: bool,
    ) -> Result<Arc<Browser>> {
        self.ensure_open()?;

        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let slot = {
            let mut profiles = self.profiles.lock().await;
            Arc::clone(profiles.entry(key.clone()).or_default())
        };

        let mut guard = slot.lock().await;
        if let Some(wrapper) = guard.as_ref() {
            if wrapper.is_alive().await {
                return Ok(wrapper.browser_arc());
            }
            if let Some(dead) = guard.take() {
                dead.shutdown().await;
            }
        }

        let user_data_dir = prepare_persistent_profile(&key)?;
        info!("Launching profile browser for {}", user_data_dir.display());
        let (browser, handler) = launch_browser(&LaunchOptions {
            headless: !headed,
            stealth,
            user_data_dir,
        })
        .await?;

        let wrapper = BrowserWrapper::with_persistent_profile(browser, handler);
        let browser = wrapper.browser_arc();
        *guard = Some(wrapper);
        Ok(browser)
    }

    async fn get_singleton(
        &self,
        slot: &Mutex<Option<BrowserWrapper>>,
        stealth: bool,
    ) -> Result<(Arc<Browser>, bool)> {
        self.ensure_open()?;

        let mut guard = slot.lock().await;
        let mut relaunched = false;

        if let Some(wrapper) = guard.as_ref() {
            if wrapper.is_alive().await {
                return Ok((wrapper.browser_arc(), false));
            }
            warn!("Browser (stealth={stealth}) is unhealthy, relaunching");
            if let Some(dead) = guard.take() {
                dead.shutdown().await;
            }
            relaunched = true;
        }

        let profile = create_unique_profile(if stealth {
            "webfetch_chrome_stealth"
        } else {
            PROFILE_PREFIX
        })
        .context("Failed to create browser profile")?;

        let (browser, handler) = launch_browser(&LaunchOptions {
            headless: self.headless,
            stealth,
            user_data_dir: profile.path().to_path_buf(),
        })
        .await?;

        // Ownership of the directory moves to the wrapper only after a successful launch
        let wrapper = BrowserWrapper::with_temp_profile(browser, handler, profile.into_path());
        let browser = wrapper.browser_arc();
        *guard = Some(wrapper);
        Ok((browser, relaunched))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(FetchError::network("Browser pool is shut down"))
        } else {
            Ok(())
        }
    }

    /// Take an idle pre-warmed page, if any
    pub async fn take_pooled_page(&self) -> Option<Page> {
        self.pages.lock().await.pop_front()
    }

    /// Return a page after use: reset it and keep it if the pool has room, else close it
    pub async fn recycle_pooled_page(&self, page: Page) {
        if self.closed.load(Ordering::SeqCst) {
            close_page(page).await;
            return;
        }

        match tokio::time::timeout(RECYCLE_TIMEOUT, page.goto("about:blank")).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!("Page reset failed, closing it: {e}");
                close_page(page).await;
                return;
            }
            Err(_) => {
                debug!("Page reset timed out, closing it");
                close_page(page).await;
                return;
            }
        }

        let mut pages = self.pages.lock().await;
        if pages.len() < self.page_pool_size {
            pages.push_back(page);
            debug!("Recycled page into pool ({}/{})", pages.len(), self.page_pool_size);
        } else {
            drop(pages);
            close_page(page).await;
        }
    }

    /// Top the idle pool up to `page_pool_size` blank pages of `browser`
    pub async fn ensure_page_pool(&self, browser: &Browser) {
        let mut pages = self.pages.lock().await;
        while pages.len() < self.page_pool_size {
            match browser.new_page("about:blank").await {
                Ok(page) => pages.push_back(page),
                Err(e) => {
                    warn!("Failed to pre-warm page: {e}");
                    break;
                }
            }
        }
    }

    /// Wait for an admission slot (see [`AdmissionGate::acquire`])
    pub async fn acquire_slot(&self, cancel: &CancellationToken) -> Result<PageSlot> {
        self.ensure_open()?;
        self.gate.acquire(cancel).await
    }

    /// Rendered fetches currently holding a slot
    #[must_use]
    pub fn active_pages(&self) -> usize {
        self.gate.active()
    }

    #[must_use]
    pub fn max_concurrent_pages(&self) -> usize {
        self.gate.max()
    }

    /// Idle pages currently pooled
    pub async fn pooled_pages(&self) -> usize {
        self.pages.lock().await.len()
    }

    /// Close pooled pages and every browser, removing throwaway profiles.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down browser pool");
        self.gate.close();

        let pages = std::mem::take(&mut *self.pages.lock().await);
        for page in pages {
            close_page(page).await;
        }

        if let Some(wrapper) = self.default_browser.lock().await.take() {
            wrapper.shutdown().await;
        }
        if let Some(wrapper) = self.stealth_browser.lock().await.take() {
            wrapper.shutdown().await;
        }

        let profiles: Vec<_> = self.profiles.lock().await.drain().collect();
        for (dir, slot) in profiles {
            if let Some(wrapper) = slot.lock().await.take() {
                debug!("Closing profile browser for {}", dir.display());
                wrapper.shutdown().await;
            }
        }
        info!("Browser pool shutdown complete");
    }
}

pub(crate) async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        debug!("Failed to close page: {e}");
    }
}
