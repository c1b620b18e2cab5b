//! Build-root mount tracking. Mounts are recorded in order so teardown can
//! run in reverse, and rollback can unmount best-effort without failing.

use crate::CoreError;
use kodos_config::manifest::Partition;
use kodos_exec::CommandRunner;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct MountStack<'a> {
    runner: &'a dyn CommandRunner,
    mounted: Vec<PathBuf>,
}

impl<'a> MountStack<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            mounted: Vec::new(),
        }
    }

    /// Run a mount command and record `target` for teardown.
    pub fn mount(&mut self, cmd: &str, target: impl Into<PathBuf>) -> Result<(), CoreError> {
        let target = target.into();
        self.runner.run(cmd).map_err(|source| CoreError::Mount {
            target: target.clone(),
            source,
        })?;
        self.mounted.push(target);
        Ok(())
    }

    /// Unmount everything in reverse mount order, failing on the first error.
    /// Used on the commit path where a stuck mount is a real problem.
    pub fn unmount_all(&mut self) -> Result<(), CoreError> {
        while let Some(target) = self.mounted.pop() {
            self.runner
                .run(&format!("umount {}", target.display()))
                .map_err(|source| CoreError::Unmount {
                    target: target.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Unmount everything in reverse order, logging failures and continuing.
    /// Used during rollback, which never raises past its own boundary.
    pub fn unmount_best_effort(&mut self) {
        while let Some(target) = self.mounted.pop() {
            if let Err(e) = self.runner.run(&format!("umount {}", target.display())) {
                warn!("could not unmount {} during cleanup: {e}", target.display());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mounted.is_empty()
    }
}

/// Mount command for a configured partition under `prefix`, matching how the
/// installer mounts the target hierarchy.
pub fn partition_mount_command(part: &Partition, prefix: &Path) -> String {
    let target = format!("{}{}", prefix.display(), part.mount);
    format!(
        "mount -t {} -o {} {} {}",
        part.fstype, part.options, part.source, target
    )
}
