use kodos_config::manifest::{RepositoryDecl, RepositoryKind};
use std::path::Path;

/// One package source. Implementations generate commands; they never execute
/// anything themselves. All generated commands are meant to run inside the
/// target root.
pub trait RepositoryBackend: Send + Sync {
    /// Backend kind name, for logs. The declared repository name is the
    /// identity; this is only the mechanism behind it.
    fn name(&self) -> &str;

    /// Setup commands run inside the target root before this repository's
    /// first install of a pass. Must be idempotent; a repository that needs
    /// no setup returns nothing.
    fn prepare(&self) -> Vec<String> {
        Vec::new()
    }

    /// Install `packages`, `None` when the list is empty.
    fn install_command(&self, packages: &[String]) -> Option<String>;

    /// Remove `packages`, `None` when the list is empty.
    fn remove_command(&self, packages: &[String]) -> Option<String>;

    /// Upgrade `packages`; an empty list upgrades everything this repository
    /// manages. `None` when the backend has no upgrade for that shape.
    fn upgrade_command(&self, packages: &[String]) -> Option<String>;

    /// Refresh the package database, `None` when the backend has none.
    fn refresh_command(&self) -> Option<String>;

    /// Commands that each fail when the named package does not exist, one
    /// per package. Backends without a cheap existence check return nothing.
    fn validate_commands(&self, _packages: &[String]) -> Vec<String> {
        Vec::new()
    }

    /// Bootstrap a fresh base system onto `mount_point`. Runs on the host,
    /// not in a chroot. Only base distribution backends support this.
    fn bootstrap_command(&self, _mount_point: &Path, _packages: &[String]) -> Option<String> {
        None
    }

    /// Command whose output contains the kernel image path owned by
    /// `package`. Only base distribution backends support this.
    fn kernel_file_command(&self, _package: &str) -> Option<String> {
        None
    }

    /// Command listing installed packages with versions, for the lock file.
    fn list_installed_command(&self) -> Option<String> {
        None
    }
}

/// Instantiate the backend for a declared repository. Total over the
/// configuration's kind enum, so two declarations of the same kind (say two
/// PPAs) get two independent backends.
pub fn backend_for(decl: &RepositoryDecl) -> Box<dyn RepositoryBackend> {
    match &decl.kind {
        RepositoryKind::Arch { mirror_url } => {
            Box::new(crate::pacman::PacmanBackend::new(mirror_url))
        }
        RepositoryKind::Aur { helper, helper_url } => {
            Box::new(crate::aur::AurBackend::new(helper, helper_url))
        }
        RepositoryKind::Debian { components } => {
            Box::new(crate::apt::AptBackend::new(components.clone()))
        }
        RepositoryKind::Ppa { ppa } => Box::new(crate::ppa::PpaBackend::new(ppa)),
        RepositoryKind::Flatpak { remote, remote_url } => {
            Box::new(crate::flatpak::FlatpakBackend::new(remote, remote_url))
        }
        RepositoryKind::Snap { classic, channel } => Box::new(crate::snap::SnapBackend::new(
            *classic,
            channel.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodos_config::manifest::parse_config_str;

    #[test]
    fn selects_backend_per_declared_kind() {
        let config = parse_config_str(
            r#"
[[repository]]
name = "arch"
kind = "arch"

[[repository]]
name = "aur"
kind = "aur"
helper = "yay"
helper_url = "https://aur.archlinux.org/yay.git"

[[repository]]
name = "flathub"
kind = "flatpak"
"#,
        )
        .unwrap();
        let names: Vec<String> = config
            .repositories
            .iter()
            .map(|decl| backend_for(decl).name().to_owned())
            .collect();
        assert_eq!(names, ["pacman", "aur", "flatpak"]);
    }

    #[test]
    fn two_ppa_declarations_get_independent_backends() {
        let config = parse_config_str(
            r#"
[[repository]]
name = "debian"
kind = "debian"

[[repository]]
name = "ppa-mozilla"
kind = "ppa"
ppa = "ppa:mozillateam/ppa"

[[repository]]
name = "ppa-git"
kind = "ppa"
ppa = "ppa:git-core/ppa"
"#,
        )
        .unwrap();
        let mozilla = backend_for(config.repository("ppa-mozilla").unwrap());
        let git = backend_for(config.repository("ppa-git").unwrap());
        assert!(mozilla
            .prepare()
            .iter()
            .any(|c| c.contains("ppa:mozillateam/ppa")));
        assert!(git.prepare().iter().any(|c| c.contains("ppa:git-core/ppa")));
    }
}
