use chromiumoxide::browser::Browser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A launched browser together with its CDP handler task
///
/// The handler is aborted on drop. A throwaway profile directory, if any, is
/// removed after the browser exits; persistent profiles are left alone.
#[derive(Debug)]
pub struct BrowserWrapper {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    temp_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    /// Wrap a browser whose profile directory is deleted on cleanup
    pub(crate) fn with_temp_profile(browser: Browser, handler: JoinHandle<()>, dir: PathBuf) -> Self {
        Self {
            browser: Arc::new(browser),
            handler,
            temp_dir: Some(dir),
        }
    }

    /// Wrap a browser running on a caller-owned profile directory
    pub(crate) fn with_persistent_profile(browser: Browser, handler: JoinHandle<()>) -> Self {
        Self {
            browser: Arc::new(browser),
            handler,
            temp_dir: None,
        }
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Shared handle for use outside the owning lock
    pub fn browser_arc(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    /// Health probe via `Browser.getVersion`
    pub async fn is_alive(&self) -> bool {
        match self.browser.version().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Browser health check failed: {e}");
                false
            }
        }
    }

    /// Close the browser, wait for the process to exit, then remove its temp profile.
    ///
    /// Graceful close needs exclusive access; while pages still hold the
    /// browser the process is left to `Browser`'s own drop.
    pub async fn shutdown(mut self) {
        match Arc::get_mut(&mut self.browser) {
            Some(browser) => {
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser cleanly: {e}");
                }
                if let Err(e) = browser.wait().await {
                    warn!("Failed to wait for browser exit: {e}");
                }
            }
            None => debug!("Browser still referenced elsewhere, skipping graceful close"),
        }
        self.cleanup_temp_dir();
    }

    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.temp_dir.take() {
            info!("Cleaning up browser profile: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to remove profile {}: {e}", path.display());
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        if self.temp_dir.is_some() {
            warn!("BrowserWrapper dropped without shutdown - removing profile in Drop");
            self.cleanup_temp_dir();
        }
    }
}
