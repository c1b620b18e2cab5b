//! Debian and Ubuntu archives, driven through apt and debootstrap.

use crate::backend::RepositoryBackend;
use crate::join_packages;
use std::path::Path;

const DEFAULT_RELEASE: &str = "stable";
const DEFAULT_MIRROR: &str = "http://deb.debian.org/debian/";

#[derive(Debug, Clone)]
pub struct AptBackend {
    components: Vec<String>,
}

impl AptBackend {
    pub fn new(components: Vec<String>) -> Self {
        let components = if components.is_empty() {
            vec!["main".to_owned()]
        } else {
            components
        };
        Self { components }
    }
}

impl RepositoryBackend for AptBackend {
    fn name(&self) -> &str {
        "apt"
    }

    fn install_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("apt-get install -y {pkgs}"))
    }

    fn remove_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("apt-get remove -y {pkgs}"))
    }

    fn upgrade_command(&self, packages: &[String]) -> Option<String> {
        match join_packages(packages) {
            None => Some("apt-get upgrade -y".to_owned()),
            Some(pkgs) => Some(format!("apt-get install --only-upgrade -y {pkgs}")),
        }
    }

    fn refresh_command(&self) -> Option<String> {
        Some("apt-get update".to_owned())
    }

    fn validate_commands(&self, packages: &[String]) -> Vec<String> {
        packages
            .iter()
            .map(|pkg| format!("apt-cache show {pkg}"))
            .collect()
    }

    // debootstrap lays down the minimal system only; the requested packages
    // are installed by the regular install pass that follows.
    fn bootstrap_command(&self, mount_point: &Path, _packages: &[String]) -> Option<String> {
        Some(format!(
            "debootstrap --components={} {DEFAULT_RELEASE} {} {DEFAULT_MIRROR}",
            self.components.join(","),
            mount_point.display()
        ))
    }

    fn kernel_file_command(&self, package: &str) -> Option<String> {
        Some(format!("dpkg-query -L {package} | grep /boot/vmlinuz-"))
    }

    fn list_installed_command(&self) -> Option<String> {
        Some("dpkg-query -W -f='${Package} ${Version}\\n'".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pkgs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn install_remove_and_refresh_commands() {
        let backend = AptBackend::new(Vec::new());
        assert_eq!(
            backend.install_command(&pkgs(&["git", "vim"])).unwrap(),
            "apt-get install -y git vim"
        );
        assert_eq!(
            backend.remove_command(&pkgs(&["nano"])).unwrap(),
            "apt-get remove -y nano"
        );
        assert_eq!(backend.refresh_command().unwrap(), "apt-get update");
    }

    #[test]
    fn targeted_upgrade_uses_only_upgrade() {
        let backend = AptBackend::new(Vec::new());
        assert_eq!(backend.upgrade_command(&[]).unwrap(), "apt-get upgrade -y");
        assert_eq!(
            backend.upgrade_command(&pkgs(&["openssl"])).unwrap(),
            "apt-get install --only-upgrade -y openssl"
        );
    }

    #[test]
    fn bootstrap_passes_components_to_debootstrap() {
        let backend = AptBackend::new(pkgs(&["main", "contrib"]));
        assert_eq!(
            backend
                .bootstrap_command(&PathBuf::from("/mnt"), &pkgs(&["systemd"]))
                .unwrap(),
            "debootstrap --components=main,contrib stable /mnt http://deb.debian.org/debian/"
        );
    }

    #[test]
    fn validation_checks_each_package() {
        let backend = AptBackend::new(Vec::new());
        assert_eq!(
            backend.validate_commands(&pkgs(&["git", "vim"])),
            vec!["apt-cache show git", "apt-cache show vim"]
        );
    }

    #[test]
    fn lock_listing_prints_package_and_version() {
        let backend = AptBackend::new(Vec::new());
        assert_eq!(
            backend.list_installed_command().unwrap(),
            "dpkg-query -W -f='${Package} ${Version}\\n'"
        );
    }
}
