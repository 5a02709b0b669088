//! Direct-then-rendered escalation
//!
//! The cheap path runs first and is retried only for plain network failures.
//! A block at the direct tier is the one signal that buys a rendered attempt;
//! a Cloudflare-flavoured reset at the rendered tier buys one more rendered
//! attempt with a longer settle wait. Everything else surfaces as is.

mod retry;

pub use retry::with_retry;

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FetchOptions, RetryPolicy};
use crate::direct_fetch::DirectFetcher;
use crate::error::{FetchError, Result};
use crate::fetch_types::{FetchMethod, FetchResult};
use crate::render::{BrowserFetcher, KeptPage, RenderOutput};
use crate::utils::constants::CLOUDFLARE_RETRY_WAIT_MS;

/// The direct HTTP tier
pub trait SimpleFetch: Send + Sync {
    fn fetch_simple(
        &self,
        url: &str,
        user_agent: Option<&str>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<FetchResult>> + Send;
}

/// The rendered browser tier
pub trait RenderedFetch: Send + Sync {
    fn fetch_rendered(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RenderOutput>> + Send;
}

impl SimpleFetch for DirectFetcher {
    fn fetch_simple(
        &self,
        url: &str,
        user_agent: Option<&str>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<FetchResult>> + Send {
        self.simple_fetch(url, user_agent, timeout, cancel)
    }
}

impl RenderedFetch for BrowserFetcher {
    fn fetch_rendered(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RenderOutput>> + Send {
        self.browser_fetch(url, options, cancel)
    }
}

/// What the strategy produced and which tier produced it
#[derive(Debug)]
pub struct StrategyOutcome {
    pub result: FetchResult,
    pub method: FetchMethod,
    pub page: Option<KeptPage>,
}

#[derive(Debug)]
pub struct Escalation<S, R> {
    simple: S,
    rendered: R,
    retry: RetryPolicy,
}

impl<S: SimpleFetch, R: RenderedFetch> Escalation<S, R> {
    pub fn new(simple: S, rendered: R, retry: RetryPolicy) -> Self {
        Self {
            simple,
            rendered,
            retry,
        }
    }

    pub fn simple(&self) -> &S {
        &self.simple
    }

    pub fn rendered(&self) -> &R {
        &self.rendered
    }

    /// Serve `url`, escalating from direct to rendered on a block.
    ///
    /// # Errors
    /// The error of the last tier attempted, unchanged.
    pub async fn run(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<StrategyOutcome> {
        if options.requires_browser() {
            debug!("Options require a browser, skipping direct fetch of {url}");
        } else {
            let direct = with_retry(&self.retry, cancel, |attempt| {
                if attempt > 0 {
                    debug!("Direct fetch of {url}, attempt {}", attempt + 1);
                }
                self.simple.fetch_simple(
                    url,
                    options.effective_user_agent(),
                    options.timeout(),
                    cancel,
                )
            })
            .await;

            match direct {
                Ok(result) => {
                    return Ok(StrategyOutcome {
                        result,
                        method: FetchMethod::Simple,
                        page: None,
                    });
                }
                Err(FetchError::Blocked { message, status }) => {
                    info!("Direct fetch blocked ({message}, status {status:?}), escalating to browser");
                }
                Err(e) => return Err(e),
            }
        }

        let method = if options.stealth() {
            FetchMethod::Stealth
        } else {
            FetchMethod::Browser
        };

        let output = match self.rendered.fetch_rendered(url, options, cancel).await {
            Ok(output) => output,
            Err(e) if e.is_cloudflare_block() => {
                warn!("Cloudflare-style reset rendering {url}, retrying with a longer settle wait: {e}");
                let patient = options.with_settle_wait(CLOUDFLARE_RETRY_WAIT_MS);
                self.rendered.fetch_rendered(url, &patient, cancel).await?
            }
            Err(e) => return Err(e),
        };

        Ok(StrategyOutcome {
            result: output.result,
            method,
            page: output.page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSimple {
        outcomes: Mutex<VecDeque<Result<FetchResult>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSimple {
        fn new(outcomes: Vec<Result<FetchResult>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SimpleFetch for ScriptedSimple {
        fn fetch_simple(
            &self,
            _url: &str,
            _user_agent: Option<&str>,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> impl Future<Output = Result<FetchResult>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::network("script exhausted")));
            async move { next }
        }
    }

    struct ScriptedRendered {
        outcomes: Mutex<VecDeque<Result<FetchResult>>>,
        waits: Mutex<Vec<u64>>,
    }

    impl ScriptedRendered {
        fn new(outcomes: Vec<Result<FetchResult>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                waits: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.waits.lock().unwrap().len()
        }
    }

    impl RenderedFetch for ScriptedRendered {
        fn fetch_rendered(
            &self,
            _url: &str,
            options: &FetchOptions,
            _cancel: &CancellationToken,
        ) -> impl Future<Output = Result<RenderOutput>> + Send {
            self.waits.lock().unwrap().push(options.wait_ms());
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::network("script exhausted")));
            async move { next.map(|result| RenderOutput { result, page: None }) }
        }
    }

    fn page(body: &str) -> Result<FetchResult> {
        Ok(FetchResult::html(body, "https://example.com/", Some(200), None))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        }
    }

    async fn run(
        simple: &ScriptedSimple,
        rendered: &ScriptedRendered,
        options: &FetchOptions,
    ) -> Result<StrategyOutcome> {
        let escalation = Escalation::new(simple, rendered, policy());
        escalation
            .run("https://example.com/", options, &CancellationToken::new())
            .await
    }

    impl<T: SimpleFetch> SimpleFetch for &T {
        fn fetch_simple(
            &self,
            url: &str,
            user_agent: Option<&str>,
            timeout: Duration,
            cancel: &CancellationToken,
        ) -> impl Future<Output = Result<FetchResult>> + Send {
            (**self).fetch_simple(url, user_agent, timeout, cancel)
        }
    }

    impl<T: RenderedFetch> RenderedFetch for &T {
        fn fetch_rendered(
            &self,
            url: &str,
            options: &FetchOptions,
            cancel: &CancellationToken,
        ) -> impl Future<Output = Result<RenderOutput>> + Send {
            (**self).fetch_rendered(url, options, cancel)
        }
    }

    #[tokio::test]
    async fn direct_success_is_simple() {
        let simple = ScriptedSimple::new(vec![page("direct")]);
        let rendered = ScriptedRendered::new(vec![]);
        let outcome = run(&simple, &rendered, &FetchOptions::default()).await.unwrap();
        assert_eq!(outcome.method, FetchMethod::Simple);
        assert_eq!(rendered.calls(), 0);
    }

    #[tokio::test]
    async fn block_escalates_to_browser_exactly_once() {
        let simple = ScriptedSimple::new(vec![Err(FetchError::blocked("403", Some(403)))]);
        let rendered = ScriptedRendered::new(vec![page("rendered")]);
        let outcome = run(&simple, &rendered, &FetchOptions::default()).await.unwrap();
        assert_eq!(outcome.method, FetchMethod::Browser);
        assert_eq!(outcome.result.html_body(), Some("rendered"));
        assert_eq!(simple.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rendered.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_is_not_escalated_or_retried() {
        let simple = ScriptedSimple::new(vec![Err(FetchError::timeout("slow"))]);
        let rendered = ScriptedRendered::new(vec![page("unused")]);
        let err = run(&simple, &rendered, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
        assert_eq!(simple.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rendered.calls(), 0);
    }

    #[tokio::test]
    async fn network_errors_retry_then_propagate() {
        let simple = ScriptedSimple::new(vec![
            Err(FetchError::network("HTTP 500")),
            Err(FetchError::network("HTTP 500")),
            Err(FetchError::network("HTTP 500")),
        ]);
        let rendered = ScriptedRendered::new(vec![]);
        let err = run(&simple, &rendered, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
        assert_eq!(simple.calls.load(Ordering::SeqCst), 3);
        assert_eq!(rendered.calls(), 0);
    }

    #[tokio::test]
    async fn forced_render_skips_direct() {
        let simple = ScriptedSimple::new(vec![page("unused")]);
        let rendered = ScriptedRendered::new(vec![page("rendered")]);
        let options = FetchOptions::builder().stealth(true).build().unwrap();
        let outcome = run(&simple, &rendered, &options).await.unwrap();
        assert_eq!(outcome.method, FetchMethod::Stealth);
        assert_eq!(simple.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cloudflare_reset_gets_one_patient_retry() {
        let simple = ScriptedSimple::new(vec![]);
        let rendered = ScriptedRendered::new(vec![
            Err(FetchError::network("net::ERR_CONNECTION_RESET")),
            page("after settle"),
        ]);
        let options = FetchOptions::builder().render(true).build().unwrap();
        let outcome = run(&simple, &rendered, &options).await.unwrap();
        assert_eq!(outcome.method, FetchMethod::Browser);
        assert_eq!(*rendered.waits.lock().unwrap(), vec![0, CLOUDFLARE_RETRY_WAIT_MS]);
    }

    #[tokio::test]
    async fn second_cloudflare_reset_propagates() {
        let simple = ScriptedSimple::new(vec![]);
        let rendered = ScriptedRendered::new(vec![
            Err(FetchError::network("net::ERR_CONNECTION_RESET")),
            Err(FetchError::network("net::ERR_CONNECTION_RESET")),
            page("never"),
        ]);
        let options = FetchOptions::builder().render(true).build().unwrap();
        let err = run(&simple, &rendered, &options).await.unwrap_err();
        assert!(err.is_cloudflare_block());
        assert_eq!(rendered.calls(), 2);
    }

    #[tokio::test]
    async fn rendered_block_propagates() {
        let simple = ScriptedSimple::new(vec![Err(FetchError::blocked("503", Some(503)))]);
        let rendered = ScriptedRendered::new(vec![Err(FetchError::blocked("challenge", Some(403)))]);
        let err = run(&simple, &rendered, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked { status: Some(403), .. }));
        assert_eq!(rendered.calls(), 1);
    }
}
