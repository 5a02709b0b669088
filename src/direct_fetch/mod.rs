//! Direct HTTP(S) fetch without a rendering engine
//!
//! One request/response cycle over a shared `reqwest::Client`: redirects are
//! followed by hand so every hop passes URL validation, the body is streamed
//! under a hard size cap, and the outcome is classified into the fetch error
//! taxonomy so the strategy can decide whether a browser is worth trying.

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, redirect};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::error::{FetchError, Result};
use crate::fetch_types::FetchResult;
use crate::url_safety::{validate_url, validate_user_agent};
use crate::utils::constants::{
    MAX_REDIRECTS, MAX_RESPONSE_BYTES, MIN_CONTENT_BYTES, random_user_agent,
};

/// Markers of an interstitial served in place of content
const CHALLENGE_MARKERS: [&str; 2] = ["cf-browser-verification", "Just a moment..."];

type UrlValidator = fn(&str) -> Result<Url>;

/// Stateless direct fetcher; cheap to clone, shares one connection pool
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: Client,
    validate: UrlValidator,
}

impl DirectFetcher {
    /// # Errors
    /// `FetchError::Network` if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .default_headers(browser_headers())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            validate: validate_url,
        })
    }

    /// Swap the URL policy. Lets in-crate tests talk to a loopback mock server.
    #[cfg(test)]
    pub(crate) fn with_url_validator(mut self, validate: UrlValidator) -> Self {
        self.validate = validate;
        self
    }

    /// Fetch `url` directly.
    ///
    /// `timeout` bounds the whole exchange including redirects and the body.
    ///
    /// # Errors
    /// - `Security`: unsafe URL or redirect, redirect loop, non-HTML content, oversized body
    /// - `Blocked`: 403/503, a near-empty body or a challenge interstitial
    /// - `Timeout`: budget exhausted
    /// - `Network`: transport failure or any other non-2xx status
    /// - `Aborted`: `cancel` fired
    pub async fn simple_fetch(
        &self,
        url: &str,
        user_agent: Option<&str>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchResult> {
        let user_agent = match user_agent {
            Some(ua) => {
                validate_user_agent(ua)?;
                ua
            }
            None => random_user_agent(),
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Aborted),
            outcome = tokio::time::timeout(timeout, self.fetch_following_redirects(url, user_agent)) => {
                outcome.map_err(|_| {
                    FetchError::timeout(format!(
                        "Direct fetch of {url} exceeded {} ms",
                        timeout.as_millis()
                    ))
                })?
            }
        }
    }

    async fn fetch_following_redirects(&self, url: &str, user_agent: &str) -> Result<FetchResult> {
        let mut current = (self.validate)(url)?;
        let mut seen = HashSet::from([loop_key(&current)]);
        let mut hops = 0usize;

        loop {
            trace!("GET {current}");
            let response = self
                .client
                .get(current.clone())
                .header(header::USER_AGENT, user_agent)
                .send()
                .await?;

            if !response.status().is_redirection() {
                return read_response(response, current).await;
            }

            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    FetchError::network(format!(
                        "Redirect {} from {current} has no usable Location header",
                        response.status()
                    ))
                })?;

            let next = current
                .join(location)
                .map_err(|e| FetchError::security(format!("Invalid redirect target {location:?}: {e}")))?;
            let next = (self.validate)(next.as_str())?;

            if !seen.insert(loop_key(&next)) {
                return Err(FetchError::security(format!(
                    "Redirect loop detected at {next}"
                )));
            }
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(FetchError::security(format!(
                    "Too many redirects (max {MAX_REDIRECTS})"
                )));
            }

            debug!("Following redirect {current} -> {next}");
            current = next;
        }
    }
}

/// Fragments never reach the server, so they cannot tell two hops apart
fn loop_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.into()
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

async fn read_response(response: Response, final_url: Url) -> Result<FetchResult> {
    let status = response.status();

    if status == StatusCode::FORBIDDEN || status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(FetchError::blocked(
            format!("{final_url} answered {status}"),
            Some(status.as_u16()),
        ));
    }
    if !status.is_success() {
        return Err(FetchError::network(format!(
            "{final_url} answered {status}"
        )));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_html = content_type.as_deref().is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("text/html") || ct.contains("application/xhtml+xml")
    });
    if !is_html {
        return Err(FetchError::security(format!(
            "Unsupported content type {:?} from {final_url}",
            content_type.as_deref().unwrap_or("<none>")
        )));
    }

    let body = read_capped(response).await?;
    let html = String::from_utf8_lossy(&body).into_owned();

    if html.len() < MIN_CONTENT_BYTES {
        return Err(FetchError::blocked(
            format!("Response from {final_url} is only {} bytes", html.len()),
            Some(status.as_u16()),
        ));
    }
    if let Some(marker) = CHALLENGE_MARKERS.iter().find(|m| html.contains(**m)) {
        return Err(FetchError::blocked(
            format!("Challenge page ({marker}) served by {final_url}"),
            Some(status.as_u16()),
        ));
    }

    Ok(FetchResult::html(
        html,
        final_url,
        Some(status.as_u16()),
        content_type,
    ))
}

/// Stream the body, refusing anything over `MAX_RESPONSE_BYTES`
async fn read_capped(response: Response) -> Result<Vec<u8>> {
    let expected_size = response.content_length().unwrap_or(0);
    if expected_size > MAX_RESPONSE_BYTES as u64 {
        return Err(FetchError::security(format!(
            "Response too large: {expected_size} bytes exceeds limit of {MAX_RESPONSE_BYTES} bytes"
        )));
    }

    let mut buffer = Vec::with_capacity(usize::try_from(expected_size).unwrap_or(0));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let new_total = buffer.len() + chunk.len();
        if new_total > MAX_RESPONSE_BYTES {
            return Err(FetchError::security(format!(
                "Response exceeded size limit during download: {new_total} bytes (max: {MAX_RESPONSE_BYTES})"
            )));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests;
