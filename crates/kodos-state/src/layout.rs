//! Path layout of the generation store. Nothing here touches the
//! filesystem; it only knows where things live.

use std::path::{Path, PathBuf};

pub const INSTALLED_PACKAGES_FILE: &str = "installed_packages";
pub const ENABLED_SERVICES_FILE: &str = "enabled_services";
pub const PACKAGES_LOCK_FILE: &str = "packages.lock";
pub const CONFIGURATION_FILE: &str = "configuration.json";
pub const MARKER_FILE: &str = ".generation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationLayout {
    state_root: PathBuf,
}

impl GenerationLayout {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    #[inline]
    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    #[inline]
    pub fn generations_dir(&self) -> PathBuf {
        self.state_root.join("generations")
    }

    #[inline]
    pub fn generation_dir(&self, id: u32) -> PathBuf {
        self.generations_dir().join(id.to_string())
    }

    #[inline]
    pub fn rootfs(&self, id: u32) -> PathBuf {
        self.generation_dir(id).join("rootfs")
    }

    /// Subvolume path relative to the filesystem root, as it appears in
    /// `rootflags=subvol=...` and in snapshot commands.
    #[inline]
    pub fn subvolume(id: u32) -> String {
        format!("generations/{id}/rootfs")
    }

    #[inline]
    pub fn installed_packages(&self, id: u32) -> PathBuf {
        self.generation_dir(id).join(INSTALLED_PACKAGES_FILE)
    }

    #[inline]
    pub fn enabled_services(&self, id: u32) -> PathBuf {
        self.generation_dir(id).join(ENABLED_SERVICES_FILE)
    }

    #[inline]
    pub fn packages_lock(&self, id: u32) -> PathBuf {
        self.generation_dir(id).join(PACKAGES_LOCK_FILE)
    }

    #[inline]
    pub fn configuration(&self, id: u32) -> PathBuf {
        self.generation_dir(id).join(CONFIGURATION_FILE)
    }

    /// Generation-id marker inside a (possibly mounted) rootfs.
    #[inline]
    pub fn marker(rootfs_root: &Path) -> PathBuf {
        rootfs_root.join(MARKER_FILE)
    }

    /// Lock taken for the duration of an install or rebuild pass.
    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.state_root.join("kodos.lock")
    }
}
