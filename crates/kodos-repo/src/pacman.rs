//! Arch Linux official repositories, driven through pacman and pacstrap.

use crate::backend::RepositoryBackend;
use crate::join_packages;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PacmanBackend {
    mirror_url: String,
}

impl PacmanBackend {
    pub fn new(mirror_url: impl Into<String>) -> Self {
        Self {
            mirror_url: mirror_url.into(),
        }
    }
}

impl RepositoryBackend for PacmanBackend {
    fn name(&self) -> &str {
        "pacman"
    }

    // Single quotes keep `$repo`/`$arch` literal for pacman to expand.
    fn prepare(&self) -> Vec<String> {
        vec![format!(
            "echo 'Server = {}$repo/os/$arch' > /etc/pacman.d/mirrorlist",
            self.mirror_url
        )]
    }

    fn install_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("pacman -S --needed --noconfirm {pkgs}"))
    }

    fn remove_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("pacman -Rnsc --noconfirm {pkgs}"))
    }

    fn upgrade_command(&self, packages: &[String]) -> Option<String> {
        match join_packages(packages) {
            None => Some("pacman -Syu --noconfirm".to_owned()),
            Some(pkgs) => Some(format!("pacman -S --needed --noconfirm {pkgs}")),
        }
    }

    fn refresh_command(&self) -> Option<String> {
        Some("pacman -Sy".to_owned())
    }

    fn validate_commands(&self, packages: &[String]) -> Vec<String> {
        packages
            .iter()
            .map(|pkg| format!("pacman -Si {pkg}"))
            .collect()
    }

    fn bootstrap_command(&self, mount_point: &Path, packages: &[String]) -> Option<String> {
        let pkgs = join_packages(packages)?;
        Some(format!("pacstrap -K {} {pkgs}", mount_point.display()))
    }

    // Output is "linux /usr/lib/modules/<kver>/vmlinuz"; the version is the
    // path component before the image name.
    fn kernel_file_command(&self, package: &str) -> Option<String> {
        Some(format!("pacman -Ql {package} | grep vmlinuz"))
    }

    fn list_installed_command(&self) -> Option<String> {
        Some("pacman -Q".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pkgs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    fn backend() -> PacmanBackend {
        PacmanBackend::new("https://mirror.rackspace.com/archlinux/")
    }

    #[test]
    fn prepare_writes_the_configured_mirror() {
        let cmds = backend().prepare();
        assert_eq!(
            cmds,
            vec![
                "echo 'Server = https://mirror.rackspace.com/archlinux/$repo/os/$arch' \
                 > /etc/pacman.d/mirrorlist"
            ]
        );
    }

    #[test]
    fn install_and_remove_commands() {
        let backend = backend();
        assert_eq!(
            backend.install_command(&pkgs(&["git", "vim"])).unwrap(),
            "pacman -S --needed --noconfirm git vim"
        );
        assert_eq!(
            backend.remove_command(&pkgs(&["nano"])).unwrap(),
            "pacman -Rnsc --noconfirm nano"
        );
    }

    #[test]
    fn empty_package_list_is_a_no_op() {
        let backend = backend();
        assert!(backend.install_command(&[]).is_none());
        assert!(backend.remove_command(&[]).is_none());
    }

    #[test]
    fn empty_upgrade_means_full_system_upgrade() {
        let backend = backend();
        assert_eq!(
            backend.upgrade_command(&[]).unwrap(),
            "pacman -Syu --noconfirm"
        );
        assert_eq!(
            backend.upgrade_command(&pkgs(&["linux"])).unwrap(),
            "pacman -S --needed --noconfirm linux"
        );
    }

    #[test]
    fn bootstrap_uses_pacstrap() {
        let backend = backend();
        assert_eq!(
            backend
                .bootstrap_command(&PathBuf::from("/mnt"), &pkgs(&["base", "linux"]))
                .unwrap(),
            "pacstrap -K /mnt base linux"
        );
    }

    #[test]
    fn kernel_file_query_greps_package_contents() {
        let backend = backend();
        assert_eq!(
            backend.kernel_file_command("linux-lts").unwrap(),
            "pacman -Ql linux-lts | grep vmlinuz"
        );
    }
}
