//! Package repository backends.
//!
//! A backend is a pure command generator: it turns package lists into the
//! shell commands its package manager understands, and the engine decides
//! where and whether to run them. This keeps backends trivially testable and
//! keeps every execution path (real, chroot, dry-run) in one place.

pub mod apt;
pub mod aur;
pub mod backend;
pub mod flatpak;
pub mod mock;
pub mod pacman;
pub mod ppa;
pub mod snap;

pub use backend::{backend_for, RepositoryBackend};
pub use mock::MockRepository;

/// Join package names for a command line, `None` when there is nothing to do.
pub(crate) fn join_packages(packages: &[String]) -> Option<String> {
    if packages.is_empty() {
        None
    } else {
        Some(packages.join(" "))
    }
}
