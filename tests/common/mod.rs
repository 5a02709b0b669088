//! Test utilities shared by the webfetch integration tests

use kodegen_tools_webfetch::{FetchError, FetchResult, RenderOutput, RenderedFetch, SimpleFetch};
use kodegen_tools_webfetch::FetchOptions;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Minimal HTML document
#[allow(dead_code)]
pub fn html_page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{title}</title></head>
<body>{body}</body>
</html>"#
    )
}

#[allow(dead_code)]
pub fn ok_page(body: &str) -> Result<FetchResult, FetchError> {
    Ok(FetchResult::html(
        html_page("test", body),
        "https://example.com/",
        Some(200),
        Some("text/html".to_string()),
    ))
}

/// Direct tier that replays scripted outcomes and counts calls
#[allow(dead_code)]
pub struct ScriptedDirect {
    outcomes: Mutex<VecDeque<Result<FetchResult, FetchError>>>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedDirect {
    pub fn new(outcomes: Vec<Result<FetchResult, FetchError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SimpleFetch for ScriptedDirect {
    fn fetch_simple(
        &self,
        _url: &str,
        _user_agent: Option<&str>,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> impl Future<Output = Result<FetchResult, FetchError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::network("no scripted outcome left")));
        async move { next }
    }
}

/// Rendered tier that replays scripted outcomes and records each call's options
#[allow(dead_code)]
pub struct ScriptedRendered {
    outcomes: Mutex<VecDeque<Result<FetchResult, FetchError>>>,
    pub seen: Mutex<Vec<FetchOptions>>,
}

#[allow(dead_code)]
impl ScriptedRendered {
    pub fn new(outcomes: Vec<Result<FetchResult, FetchError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl RenderedFetch for ScriptedRendered {
    fn fetch_rendered(
        &self,
        _url: &str,
        options: &FetchOptions,
        _cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RenderOutput, FetchError>> + Send {
        self.seen.lock().unwrap().push(options.clone());
        let next = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::network("no scripted outcome left")));
        async move { next.map(|result| RenderOutput { result, page: None }) }
    }
}
