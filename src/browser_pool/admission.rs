//! Bounded admission for rendered fetches
//!
//! A semaphore caps concurrently active pages; the wait for a permit has its
//! own ceiling and races the caller's cancellation token.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FetchError, Result};

#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    max: usize,
    queue_timeout: Duration,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(max: usize, queue_timeout: Duration) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            active: Arc::new(AtomicUsize::new(0)),
            max,
            queue_timeout,
        }
    }

    /// Wait for a slot.
    ///
    /// # Errors
    /// `Timeout` after `queue_timeout`, `Aborted` when `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<PageSlot> {
        let semaphore = Arc::clone(&self.semaphore);

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Aborted),
            permit = tokio::time::timeout(self.queue_timeout, semaphore.acquire_owned()) => match permit {
                Ok(Ok(permit)) => permit,
                Ok(Err(_closed)) => {
                    return Err(FetchError::network("Browser pool is shut down"));
                }
                Err(_elapsed) => {
                    warn!(
                        "No page slot within {:?} ({} active)",
                        self.queue_timeout,
                        self.active()
                    );
                    return Err(FetchError::timeout(format!(
                        "Waited {} ms for a free browser page",
                        self.queue_timeout.as_millis()
                    )));
                }
            },
        };

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Page slot acquired ({now_active}/{})", self.max);
        Ok(PageSlot {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Refuse all future admissions
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// One admitted rendered fetch. Dropping it frees the slot exactly once.
#[derive(Debug)]
pub struct PageSlot {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for PageSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
