//! Rendered fetch engine
//!
//! One fetch walks acquire → configure → navigate → stabilize → act →
//! extract → release. Admission is charged to the pool's queue ceiling, the
//! rest to the caller's `timeout_ms`. The page lease lives outside the timed
//! and cancellable section so its release always runs.

mod actions;
mod document;
mod interception;
mod lease;
mod navigation;
mod stabilize;

pub use lease::KeptPage;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use self::document::{DocumentResponse, DocumentWatch, response_body};
use self::interception::Interception;
use self::lease::PageLease;
use self::navigation::classify_navigation_error;
use crate::browser_pool::BrowserPool;
use crate::challenge::detect_challenge;
use crate::config::{Cookie, Device, FetchOptions, StabilizationConfig};
use crate::error::{FetchError, Result};
use crate::fetch_types::{FetchBody, FetchResult};
use crate::stealth::StealthProfile;
use crate::url_safety::validate_url;

/// Poll cadence for `wait_selector`
const SELECTOR_POLL: Duration = Duration::from_millis(200);

/// Upper bound on page teardown once a fetch is over
const RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// A rendered result, plus the live page when `keep_page_open` was set
#[derive(Debug)]
pub struct RenderOutput {
    pub result: FetchResult,
    pub page: Option<KeptPage>,
}

#[derive(Debug)]
pub struct BrowserFetcher {
    pool: Arc<BrowserPool>,
    stabilization: StabilizationConfig,
    stealth_profile: StealthProfile,
}

impl BrowserFetcher {
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>, stabilization: StabilizationConfig) -> Self {
        Self {
            pool,
            stabilization,
            stealth_profile: StealthProfile::default(),
        }
    }

    #[must_use]
    pub fn with_stealth_profile(mut self, profile: StealthProfile) -> Self {
        self.stealth_profile = profile;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }

    /// Render `url` in Chromium.
    ///
    /// # Errors
    /// `Security` for rejected input, `Timeout` when admission or the fetch
    /// budget runs out, `Blocked` for a challenge page or a refused
    /// navigation, `Network` for other browser failures, `Aborted` on cancel.
    pub async fn browser_fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<RenderOutput> {
        let target = validate_url(url)?;
        options.validate()?;
        if cancel.is_cancelled() {
            return Err(FetchError::Aborted);
        }

        let slot = self.pool.acquire_slot(cancel).await?;
        let deadline = Instant::now() + options.timeout();
        let budget_exceeded = || {
            FetchError::timeout(format!(
                "Rendering {target} exceeded {} ms",
                options.timeout_ms()
            ))
        };

        let acquired = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Aborted),
            lease = timeout_at(
                deadline,
                PageLease::acquire(Arc::clone(&self.pool), options, &self.stealth_profile),
            ) => lease,
        };
        let mut lease = match acquired {
            Ok(lease) => lease?,
            Err(_) => return Err(budget_exceeded()),
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Aborted),
            rendered = timeout_at(deadline, self.render(&mut lease, &target, options)) => {
                rendered.unwrap_or_else(|_| Err(budget_exceeded()))
            }
        };

        match outcome {
            Ok(result) if options.keep_page_open() => {
                let page = lease.keep(slot).await;
                Ok(RenderOutput {
                    result,
                    page: Some(page),
                })
            }
            Ok(result) => {
                release(lease, false).await;
                drop(slot);
                Ok(RenderOutput { result, page: None })
            }
            Err(FetchError::Aborted) => {
                info!("Rendered fetch of {target} cancelled, closing its page");
                release(lease, true).await;
                drop(slot);
                Err(FetchError::Aborted)
            }
            Err(e) => {
                release(lease, false).await;
                drop(slot);
                Err(e)
            }
        }
    }

    async fn render(
        &self,
        lease: &mut PageLease,
        target: &Url,
        options: &FetchOptions,
    ) -> Result<FetchResult> {
        configure(lease.page(), target, options).await?;
        let interception = Interception::start(lease.page(), &options.blocked_resources()).await?;
        lease.set_interception(interception);

        let page = lease.page();
        let watch = DocumentWatch::start(page).await?;

        let navigation = page.goto(target.as_str()).await;
        if let Some(reason) = lease.refused_navigation() {
            return Err(FetchError::security(reason));
        }
        let main_response = watch.response();
        if let Err(e) = navigation {
            // Downloads abort the navigation but the body is still there
            if !main_response.as_ref().is_some_and(DocumentResponse::is_binary) {
                return Err(classify_navigation_error(target.as_str(), &e.to_string()));
            }
        }

        let status = main_response.as_ref().map(|d| d.status).filter(|s| *s > 0);
        let content_type = main_response.as_ref().map(|d| d.mime_type.clone());

        if let Some(doc) = main_response.filter(DocumentResponse::is_binary) {
            debug!("Passing through binary document {} ({})", doc.url, doc.mime_type);
            let bytes = response_body(page, doc.request_id.clone()).await?;
            return Ok(FetchResult {
                body: FetchBody::Binary(bytes),
                final_url: doc.url,
                status_code: status,
                content_type,
                screenshot: None,
            });
        }

        if options.wait_ms() > 0 {
            sleep(Duration::from_millis(options.wait_ms())).await;
        }
        stabilize::stabilize(page, &self.stabilization).await?;

        if let Some(selector) = options.wait_selector() {
            stabilize::wait_for_selector(page, selector, SELECTOR_POLL).await;
        }
        if !options.actions().is_empty() {
            actions::run_actions(page, options.actions())
                .await
                .map_err(|e| FetchError::network(format!("{e:#}")))?;
        }
        if options.stealth() {
            let (min, max) = self.stabilization.stealth_jitter_ms;
            sleep(Duration::from_millis(rand::random_range(min..=max.max(min)))).await;
        }

        // Scripts and actions can navigate after load
        if let Some(reason) = lease.refused_navigation() {
            return Err(FetchError::security(reason));
        }

        let mut html = page.content().await?;
        let detection = detect_challenge(&html, status);
        if detection.is_challenge {
            warn!(
                "{:?} challenge at {target} (confidence {:.2})",
                detection.kind, detection.confidence
            );
            return Err(FetchError::blocked(
                format!(
                    "{:?} challenge detected at {target} (confidence {:.2})",
                    detection.kind, detection.confidence
                ),
                status,
            ));
        }
        if detection.is_empty_shell() {
            debug!("{target} rendered an empty shell, settling once more");
            stabilize::stabilize(page, &self.stabilization).await?;
            html = page.content().await?;
            if let Some(reason) = lease.refused_navigation() {
                return Err(FetchError::security(reason));
            }
        }

        let screenshot = if options.screenshot() {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(options.screenshot_full_page())
                .build();
            Some(page.screenshot(params).await?)
        } else {
            None
        };

        let final_url = page
            .url()
            .await?
            .unwrap_or_else(|| target.to_string());

        let mut result = FetchResult::html(html, final_url, status, content_type);
        result.screenshot = screenshot;
        Ok(result)
    }
}

async fn release(lease: PageLease, cancelled: bool) {
    let teardown = async move {
        if cancelled {
            lease.discard().await;
        } else {
            lease.release().await;
        }
    };
    if timeout(RELEASE_TIMEOUT, teardown).await.is_err() {
        warn!("Page release did not finish within {RELEASE_TIMEOUT:?}");
    }
}

/// Identity, viewport, headers and cookies, applied before navigation
async fn configure(page: &Page, target: &Url, options: &FetchOptions) -> Result<()> {
    if options.device() != Device::Desktop {
        let viewport = options.device().viewport();
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width)
            .height(viewport.height)
            .device_scale_factor(viewport.device_scale_factor)
            .mobile(viewport.mobile)
            .build()
            .map_err(FetchError::network)?;
        page.execute(metrics).await?;
    }

    if let Some(user_agent) = options.effective_user_agent() {
        page.execute(SetUserAgentOverrideParams::new(user_agent))
            .await?;
    }

    if !options.headers().is_empty() {
        let headers = serde_json::to_value(options.headers())
            .map_err(|e| FetchError::network(format!("Failed to encode headers: {e}")))?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
            .await?;
    }

    let cookies = options
        .cookies()
        .iter()
        .chain(options.storage_state().into_iter().flatten())
        .map(|cookie| cookie_param(cookie, target))
        .collect::<Result<Vec<_>>>()?;
    if !cookies.is_empty() {
        debug!("Setting {} cookies", cookies.len());
        page.set_cookies(cookies).await?;
    }
    Ok(())
}

fn cookie_param(cookie: &Cookie, target: &Url) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    builder = match &cookie.domain {
        Some(domain) => builder.domain(domain.clone()),
        None => builder.url(target.as_str()),
    };
    if let Some(path) = &cookie.path {
        builder = builder.path(path.clone());
    }
    builder.build().map_err(FetchError::network)
}
