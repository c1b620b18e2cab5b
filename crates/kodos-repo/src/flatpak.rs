//! Flatpak applications from a configured remote.

use crate::backend::RepositoryBackend;
use crate::join_packages;

#[derive(Debug, Clone)]
pub struct FlatpakBackend {
    remote: String,
    remote_url: String,
}

impl FlatpakBackend {
    pub fn new(remote: impl Into<String>, remote_url: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            remote_url: remote_url.into(),
        }
    }
}

impl RepositoryBackend for FlatpakBackend {
    fn name(&self) -> &str {
        "flatpak"
    }

    fn prepare(&self) -> Vec<String> {
        vec![format!(
            "flatpak remote-add --if-not-exists {} {}",
            self.remote, self.remote_url
        )]
    }

    fn install_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("flatpak install -y {} {pkgs}", self.remote))
    }

    fn remove_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("flatpak uninstall -y {} {pkgs}", self.remote))
    }

    fn upgrade_command(&self, packages: &[String]) -> Option<String> {
        match join_packages(packages) {
            None => Some("flatpak update -y".to_owned()),
            Some(pkgs) => Some(format!("flatpak update -y {pkgs}")),
        }
    }

    fn refresh_command(&self) -> Option<String> {
        None
    }
}
