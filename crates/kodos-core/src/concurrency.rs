//! Single-pass discipline: one exclusive lock per state root, plus a
//! process-wide shutdown flag checked between lifecycle phases so a Ctrl-C
//! lands in the same rollback path as an ordinary failure.

use crate::CoreError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Exclusive lock held for the duration of an install or rebuild pass.
/// Released on drop.
pub struct PassLock {
    file: File,
    path: PathBuf,
}

impl PassLock {
    pub fn acquire(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| CoreError::LockHeld(path.to_path_buf()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!("could not release lock {}: {e}", self.path.display());
        }
    }
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl-C handler. Call once at process start; the lifecycle
/// polls [`shutdown_requested`] between phases.
pub fn install_signal_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        warn!("interrupt received, finishing current step then rolling back");
        request_shutdown();
    })
}

pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Clears the flag; passes are sequential within one process.
pub fn reset_shutdown() {
    SHUTDOWN.store(false, Ordering::SeqCst);
}
