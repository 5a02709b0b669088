//! Request guard on the CDP Fetch domain
//!
//! Every request of a rendered page pauses at the request stage. Document
//! requests (top-level navigations, redirect hops, frames, script-driven
//! location changes) go through the same URL policy as the initial URL; a
//! refused one is failed and remembered so the fetch can surface it.
//! Resource-type blocking is the second rule of the same listener. The
//! listener must be running before navigation starts or paused requests
//! would stall the load.

use anyhow::Result;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, DisableParams, EnableParams, EventRequestPaused, FailRequestParams,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{self, ErrorReason};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::ResourceType;
use crate::url_safety::validate_url;

/// What to do with one paused request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Continue,
    /// Refused resource type, or a subresource aimed at an unsafe host
    Block,
    /// Document navigation the URL policy rejects; fails the whole fetch
    Refuse(String),
}

/// Judge a paused request by its type and URL
pub(crate) fn judge(
    resource_type: &network::ResourceType,
    url: &str,
    blocked: &[network::ResourceType],
) -> Verdict {
    if *resource_type == network::ResourceType::Document {
        if let Err(e) = validate_url(url) {
            return Verdict::Refuse(format!("Navigation to {url} refused: {e}"));
        }
    } else if is_http(url) && validate_url(url).is_err() {
        return Verdict::Block;
    }

    if blocked.contains(resource_type) {
        Verdict::Block
    } else {
        Verdict::Continue
    }
}

fn is_http(url: &str) -> bool {
    let scheme = url.split_once(':').map_or("", |(scheme, _)| scheme);
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

/// Live guard on one page; stop it before the page is reused
#[derive(Debug)]
pub(crate) struct Interception {
    task: JoinHandle<()>,
    blocked: Arc<AtomicUsize>,
    refused: Arc<Mutex<Option<String>>>,
}

impl Interception {
    /// Start guarding `page`, refusing `blocked` resource types on top of the URL policy
    pub(crate) async fn start(page: &Page, blocked: &[ResourceType]) -> Result<Self> {
        let blocked_types: Vec<network::ResourceType> =
            blocked.iter().copied().map(cdp_resource_type).collect();

        // Subscribe before enabling so no paused request slips past the listener
        let mut paused = page.event_listener::<EventRequestPaused>().await?;
        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        page.execute(EnableParams::builder().pattern(pattern).build())
            .await?;

        let counter = Arc::new(AtomicUsize::new(0));
        let refused = Arc::new(Mutex::new(None));
        let blocked_count = Arc::clone(&counter);
        let first_refusal = Arc::clone(&refused);
        let page = page.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let url = &event.request.url;
                let outcome = match judge(&event.resource_type, url, &blocked_types) {
                    Verdict::Continue => page
                        .execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ()),
                    Verdict::Block => {
                        trace!("Blocking {:?} {url}", event.resource_type);
                        blocked_count.fetch_add(1, Ordering::Relaxed);
                        page.execute(FailRequestParams::new(request_id, ErrorReason::BlockedByClient))
                            .await
                            .map(|_| ())
                    }
                    Verdict::Refuse(reason) => {
                        warn!("{reason}");
                        first_refusal.lock().get_or_insert(reason);
                        page.execute(FailRequestParams::new(request_id, ErrorReason::AccessDenied))
                            .await
                            .map(|_| ())
                    }
                };
                if let Err(e) = outcome {
                    // Usually the page navigated away or closed
                    trace!("Paused request could not be resolved: {e}");
                }
            }
        });

        Ok(Self {
            task,
            blocked: counter,
            refused,
        })
    }

    /// First document navigation refused by the URL policy, if any
    pub(crate) fn refused(&self) -> Option<String> {
        self.refused.lock().clone()
    }

    /// Stop listening and turn the Fetch domain back off
    pub(crate) async fn stop(self, page: &Page) {
        self.task.abort();
        debug!(
            "Request guard stopped, {} requests blocked",
            self.blocked.load(Ordering::Relaxed)
        );
        if let Err(e) = page.execute(DisableParams::default()).await {
            debug!("Failed to disable request interception: {e}");
        }
    }
}

impl Drop for Interception {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) fn cdp_resource_type(kind: ResourceType) -> network::ResourceType {
    match kind {
        ResourceType::Image => network::ResourceType::Image,
        ResourceType::Font => network::ResourceType::Font,
        ResourceType::Media => network::ResourceType::Media,
        ResourceType::Stylesheet => network::ResourceType::Stylesheet,
        ResourceType::Script => network::ResourceType::Script,
        ResourceType::Xhr => network::ResourceType::Xhr,
        ResourceType::Fetch => network::ResourceType::Fetch,
        ResourceType::Websocket => network::ResourceType::WebSocket,
        ResourceType::Other => network::ResourceType::Other,
    }
}
