//! Main-document response tracking and binary passthrough

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const BINARY_SUFFIXES: &[&str] = &[".pdf", ".doc", ".docx"];

/// Response headline of the top-level document
#[derive(Debug, Clone)]
pub(crate) struct DocumentResponse {
    pub request_id: RequestId,
    pub status: u16,
    pub mime_type: String,
    pub url: String,
}

impl DocumentResponse {
    pub(crate) fn is_binary(&self) -> bool {
        is_binary_content_type(&self.mime_type) || has_binary_suffix(&self.url)
    }
}

/// Records the first document response seen on a page.
///
/// Redirect hops do not emit `responseReceived`, and sub-frame documents
/// arrive after the top-level one, so the first is the one we want.
pub(crate) struct DocumentWatch {
    slot: Arc<Mutex<Option<DocumentResponse>>>,
    task: JoinHandle<()>,
}

impl DocumentWatch {
    pub(crate) async fn start(page: &Page) -> Result<Self> {
        let mut events = page.event_listener::<EventResponseReceived>().await?;
        let slot = Arc::new(Mutex::new(None));
        let writer = Arc::clone(&slot);

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.r#type != ResourceType::Document {
                    continue;
                }
                let response = DocumentResponse {
                    request_id: event.request_id.clone(),
                    status: u16::try_from(event.response.status).unwrap_or(0),
                    mime_type: event.response.mime_type.clone(),
                    url: event.response.url.clone(),
                };
                *writer.lock() = Some(response);
                break;
            }
        });

        Ok(Self { slot, task })
    }

    pub(crate) fn response(&self) -> Option<DocumentResponse> {
        self.slot.lock().clone()
    }
}

impl Drop for DocumentWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Raw bytes of a response the browser already received
pub(crate) async fn response_body(page: &Page, request_id: RequestId) -> Result<Vec<u8>> {
    let body = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .context("Failed to read document body")?
        .result;
    if body.base64_encoded {
        STANDARD
            .decode(body.body.as_bytes())
            .context("Document body is not valid base64")
    } else {
        Ok(body.body.into_bytes())
    }
}

pub(crate) fn is_binary_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    BINARY_CONTENT_TYPES.contains(&mime.as_str())
}

pub(crate) fn has_binary_suffix(url: &str) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    BINARY_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}
