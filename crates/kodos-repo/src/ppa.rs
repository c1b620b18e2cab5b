//! Ubuntu PPAs. Same apt machinery as the base archive, plus one-time
//! registration of the archive through add-apt-repository. Each declared PPA
//! is its own repository with its own identity.

use crate::backend::RepositoryBackend;
use crate::join_packages;

#[derive(Debug, Clone)]
pub struct PpaBackend {
    ppa: String,
}

impl PpaBackend {
    pub fn new(ppa: impl Into<String>) -> Self {
        Self { ppa: ppa.into() }
    }
}

impl RepositoryBackend for PpaBackend {
    fn name(&self) -> &str {
        "ppa"
    }

    fn prepare(&self) -> Vec<String> {
        vec![
            "apt-get install -y --no-install-recommends software-properties-common".to_owned(),
            format!("add-apt-repository -y {}", self.ppa),
            "apt-get update".to_owned(),
        ]
    }

    fn install_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages)
            .map(|pkgs| format!("apt-get install -y --no-install-recommends {pkgs}"))
    }

    fn remove_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("apt-get remove -y {pkgs}"))
    }

    fn upgrade_command(&self, packages: &[String]) -> Option<String> {
        match join_packages(packages) {
            None => Some("apt-get upgrade -y".to_owned()),
            Some(pkgs) => Some(format!("apt-get install -y --only-upgrade {pkgs}")),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_registers_the_archive_once() {
        let cmds = PpaBackend::new("ppa:mozillateam/ppa").prepare();
        assert_eq!(
            cmds,
            vec![
                "apt-get install -y --no-install-recommends software-properties-common",
                "add-apt-repository -y ppa:mozillateam/ppa",
                "apt-get update",
            ]
        );
    }

    #[test]
    fn install_skips_recommends() {
        let backend = PpaBackend::new("ppa:git-core/ppa");
        assert_eq!(
            backend.install_command(&["git".to_owned()]).unwrap(),
            "apt-get install -y --no-install-recommends git"
        );
    }

    #[test]
    fn ppa_cannot_bootstrap() {
        let backend = PpaBackend::new("ppa:git-core/ppa");
        assert!(backend
            .bootstrap_command(std::path::Path::new("/mnt"), &["git".to_owned()])
            .is_none());
    }
}
