//! Scoped ownership of the page a rendered fetch works on
//!
//! A [`PageLease`] knows where its page came from and releases it the matching
//! way: pooled pages go back to the pool, pages of an owned context take the
//! context down with them, profile pages stay open, anything else is closed.
//! Dropping an unreleased lease (a dropped future, a panic) schedules the
//! same teardown as a cancellation.

use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::interception::Interception;
use crate::browser_pool::{BrowserPool, PageSlot, close_page};
use crate::config::FetchOptions;
use crate::error::{FetchError, Result};
use crate::stealth::{self, StealthProfile};

/// Where a leased page came from, which decides how it is released
pub(crate) enum PageOrigin {
    /// Pre-warmed page of the default browser
    Pooled,
    /// Throwaway page in a shared browser's default context
    Fresh,
    /// Page inside a browser context created for this fetch
    Isolated {
        browser: Arc<Browser>,
        context_id: BrowserContextId,
    },
    /// Page of a caller-owned persistent profile
    Profile,
}

impl PageOrigin {
    fn label(&self) -> &'static str {
        match self {
            Self::Pooled => "pooled",
            Self::Fresh => "fresh",
            Self::Isolated { .. } => "isolated",
            Self::Profile => "profile",
        }
    }
}

pub(crate) struct PageLease {
    page: Page,
    origin: PageOrigin,
    pool: Arc<BrowserPool>,
    interception: Option<Interception>,
    released: bool,
}

impl PageLease {
    /// Get a page suited to `options`: profile browser, isolated context,
    /// pooled page or a fresh page, in that order of precedence
    pub(crate) async fn acquire(
        pool: Arc<BrowserPool>,
        options: &FetchOptions,
        stealth_profile: &StealthProfile,
    ) -> Result<Self> {
        let (page, origin) = if let Some(dir) = options.profile_dir() {
            let browser = pool
                .get_profile_browser(dir, options.headed(), options.stealth())
                .await?;
            (browser.new_page("about:blank").await?, PageOrigin::Profile)
        } else {
            let browser = if options.stealth() {
                pool.get_stealth_browser().await?
            } else {
                pool.get_browser().await?
            };

            if options.needs_isolated_context() {
                open_isolated(browser, options.proxy()).await?
            } else if options.uses_shared_pool() {
                let page = match pool.take_pooled_page().await {
                    Some(page) => page,
                    None => {
                        pool.ensure_page_pool(&browser).await;
                        match pool.take_pooled_page().await {
                            Some(page) => page,
                            None => browser.new_page("about:blank").await?,
                        }
                    }
                };
                (page, PageOrigin::Pooled)
            } else {
                (browser.new_page("about:blank").await?, PageOrigin::Fresh)
            }
        };

        let lease = Self {
            page,
            origin,
            pool,
            interception: None,
            released: false,
        };
        debug!("Leased {} page", lease.origin.label());

        if options.stealth() {
            // On failure the lease drops here and tears the page down
            stealth::inject(&lease.page, stealth_profile)
                .await
                .map_err(|e| FetchError::network(format!("Stealth setup failed: {e:#}")))?;
        }
        Ok(lease)
    }

    pub(crate) fn page(&self) -> &Page {
        &self.page
    }

    pub(crate) fn set_interception(&mut self, interception: Interception) {
        self.interception = Some(interception);
    }

    /// Document navigation the request guard refused, if any
    pub(crate) fn refused_navigation(&self) -> Option<String> {
        self.interception.as_ref().and_then(Interception::refused)
    }

    /// Normal end of a fetch: release according to origin
    pub(crate) async fn release(mut self) {
        self.released = true;
        if let Some(interception) = self.interception.take() {
            interception.stop(&self.page).await;
        }
        let page = self.page.clone();
        match std::mem::replace(&mut self.origin, PageOrigin::Fresh) {
            PageOrigin::Pooled => self.pool.recycle_pooled_page(page).await,
            PageOrigin::Fresh => close_page(page).await,
            PageOrigin::Isolated {
                browser,
                context_id,
            } => {
                close_page(page).await;
                dispose_context(&browser, context_id).await;
            }
            PageOrigin::Profile => debug!("Leaving profile page open"),
        }
    }

    /// Cancelled fetch: close the page whatever its origin
    pub(crate) async fn discard(mut self) {
        self.released = true;
        self.interception.take();
        close_page(self.page.clone()).await;
        if let PageOrigin::Isolated {
            browser,
            context_id,
        } = std::mem::replace(&mut self.origin, PageOrigin::Fresh)
        {
            dispose_context(&browser, context_id).await;
        }
    }

    /// Hand the page to the caller, who now owns its slot and teardown
    pub(crate) async fn keep(mut self, slot: PageSlot) -> KeptPage {
        self.released = true;
        if let Some(interception) = self.interception.take() {
            interception.stop(&self.page).await;
        }
        let profile = matches!(self.origin, PageOrigin::Profile);
        let context = match std::mem::replace(&mut self.origin, PageOrigin::Fresh) {
            PageOrigin::Isolated {
                browser,
                context_id,
            } => Some((browser, context_id)),
            _ => None,
        };
        KeptPage {
            page: self.page.clone(),
            context,
            _slot: slot,
            closed: profile,
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.interception.take();
        let page = self.page.clone();
        let context = match std::mem::replace(&mut self.origin, PageOrigin::Fresh) {
            PageOrigin::Isolated {
                browser,
                context_id,
            } => Some((browser, context_id)),
            _ => None,
        };
        spawn_teardown(page, context);
    }
}

async fn open_isolated(
    browser: Arc<Browser>,
    proxy: Option<&str>,
) -> Result<(Page, PageOrigin)> {
    let mut params = CreateBrowserContextParams::builder().dispose_on_detach(true);
    if let Some(proxy) = proxy {
        params = params.proxy_server(proxy);
    }
    let context_id = browser
        .execute(params.build())
        .await?
        .result
        .browser_context_id;

    let target = CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context_id.clone())
        .build()
        .map_err(FetchError::network)?;

    match browser.new_page(target).await {
        Ok(page) => Ok((
            page,
            PageOrigin::Isolated {
                browser,
                context_id,
            },
        )),
        Err(e) => {
            dispose_context(&browser, context_id).await;
            Err(e.into())
        }
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        debug!("Failed to dispose browser context: {e}");
    }
}

fn spawn_teardown(page: Page, context: Option<(Arc<Browser>, BrowserContextId)>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                close_page(page).await;
                if let Some((browser, context_id)) = context {
                    dispose_context(&browser, context_id).await;
                }
            });
        }
        Err(_) => warn!("No runtime available to close an abandoned page"),
    }
}

/// A rendered page left open for the caller (`keep_page_open`).
///
/// Holds one admission slot until closed or dropped.
pub struct KeptPage {
    page: Page,
    context: Option<(Arc<Browser>, BrowserContextId)>,
    _slot: PageSlot,
    /// Profile pages are never closed by us
    closed: bool,
}

impl KeptPage {
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the page (and its private context) and free the slot
    pub async fn close(mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        close_page(self.page.clone()).await;
        if let Some((browser, context_id)) = self.context.take() {
            dispose_context(&browser, context_id).await;
        }
    }
}

impl Drop for KeptPage {
    fn drop(&mut self) {
        if !self.closed {
            spawn_teardown(self.page.clone(), self.context.take());
        }
    }
}

impl fmt::Debug for KeptPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeptPage")
            .field("target", self.page.target_id())
            .field("isolated", &self.context.is_some())
            .finish_non_exhaustive()
    }
}
