//! Chrome profile directory management
//!
//! Throwaway profiles for the shared browsers get UUID names so concurrent
//! launches never contend for one `SingletonLock`. Persistent profiles
//! supplied by callers are reused across fetches, so a lock left behind by a
//! crashed Chrome is detected and removed before launch.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every throwaway profile directory this crate creates
pub const PROFILE_PREFIX: &str = "webfetch_chrome";

/// RAII wrapper for a throwaway profile directory
///
/// Removes the directory on drop unless `into_path()` hands it to another owner.
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disable auto-cleanup and return the path
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            debug!("Removing profile directory {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to remove profile directory {}: {e}", self.path.display());
            }
        }
    }
}

/// Create a fresh profile directory `{temp}/{prefix}_{uuid}`
pub fn create_unique_profile(prefix: &str) -> Result<BrowserProfile> {
    let path = std::env::temp_dir().join(format!("{prefix}_{}", Uuid::new_v4()));

    // create_dir fails on an existing path, so a UUID collision cannot share a profile
    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;

    debug!("Created Chrome profile directory: {}", path.display());
    Ok(BrowserProfile {
        path,
        cleanup_on_drop: true,
    })
}

/// Make a caller-supplied persistent profile directory launchable.
///
/// Creates it if missing. A `SingletonLock` whose owning process is gone is
/// removed; a live one is an error since a second Chrome cannot share it.
pub fn prepare_persistent_profile(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create profile directory: {}", dir.display()))?;
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve profile directory: {}", dir.display()))?;

    if has_singleton_lock(&dir) {
        if is_singleton_lock_stale(&dir) {
            cleanup_stale_lock(&dir)?;
        } else {
            anyhow::bail!(
                "Profile directory {} is in use by another Chrome process",
                dir.display()
            );
        }
    }
    Ok(dir)
}

fn has_singleton_lock(profile_dir: &Path) -> bool {
    let lock_path = profile_dir.join("SingletonLock");
    // Broken symlinks report false for exists()
    lock_path.exists() || lock_path.is_symlink()
}

/// Whether the profile's `SingletonLock` belongs to a process that no longer exists.
///
/// The lock is a symlink to `{hostname}-{pid}`. Unparseable locks count as
/// active; a regular file in its place counts as stale.
#[cfg(unix)]
pub fn is_singleton_lock_stale(profile_dir: &Path) -> bool {
    let lock_path = profile_dir.join("SingletonLock");
    if !has_singleton_lock(profile_dir) {
        return true;
    }

    match std::fs::read_link(&lock_path) {
        Ok(target) => {
            let target = target.to_string_lossy();
            let Some(pid) = target
                .rsplit('-')
                .next()
                .and_then(|pid| pid.parse::<i32>().ok())
            else {
                warn!("Could not parse PID from SingletonLock target: {target}");
                return false;
            };

            // kill(pid, 0) probes for existence without signalling
            // SAFETY: signal 0 performs only the permission/existence check
            let alive = unsafe { libc::kill(pid, 0) == 0 };
            if !alive {
                info!("SingletonLock in {} is stale: PID {pid} is gone", profile_dir.display());
            }
            !alive
        }
        Err(e) => {
            debug!("SingletonLock is not a symlink: {e}");
            lock_path.is_file()
        }
    }
}

#[cfg(not(unix))]
pub fn is_singleton_lock_stale(_profile_dir: &Path) -> bool {
    true
}

/// Remove the profile's `SingletonLock`; only call once it is known to be stale
pub fn cleanup_stale_lock(profile_dir: &Path) -> Result<()> {
    let lock_path = profile_dir.join("SingletonLock");
    if has_singleton_lock(profile_dir) {
        info!("Removing stale SingletonLock: {}", lock_path.display());
        std::fs::remove_file(&lock_path)
            .with_context(|| format!("Failed to remove SingletonLock: {}", lock_path.display()))?;
    }
    Ok(())
}
