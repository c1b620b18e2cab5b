//! Arch User Repository, driven through a pacman-compatible AUR helper.
//!
//! The helper itself comes from the AUR, so preparation builds it from its
//! git checkout as the unprivileged service user.

use crate::backend::RepositoryBackend;
use crate::join_packages;

#[derive(Debug, Clone)]
pub struct AurBackend {
    helper: String,
    helper_url: String,
}

impl AurBackend {
    pub fn new(helper: impl Into<String>, helper_url: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            helper_url: helper_url.into(),
        }
    }
}

impl RepositoryBackend for AurBackend {
    fn name(&self) -> &str {
        "aur"
    }

    fn prepare(&self) -> Vec<String> {
        vec![
            "pacman -S --needed --noconfirm git base-devel".to_owned(),
            format!(
                "runuser -u kod -- /bin/bash -c 'cd && git clone {} {} && cd {} && makepkg -si --noconfirm'",
                self.helper_url, self.helper, self.helper
            ),
        ]
    }

    fn install_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages)
            .map(|pkgs| format!("{} -S --needed --noconfirm {pkgs}", self.helper))
    }

    fn remove_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("{} -R --noconfirm {pkgs}", self.helper))
    }

    fn upgrade_command(&self, packages: &[String]) -> Option<String> {
        match join_packages(packages) {
            None => Some(format!("{} -Syu --noconfirm", self.helper)),
            Some(pkgs) => Some(format!("{} -S --needed --noconfirm {pkgs}", self.helper)),
        }
    }

    fn refresh_command(&self) -> Option<String> {
        Some(format!("{} -Sy", self.helper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> AurBackend {
        AurBackend::new("yay", "https://aur.archlinux.org/yay.git")
    }

    #[test]
    fn prepare_builds_the_helper_as_service_user() {
        let cmds = backend().prepare();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0], "pacman -S --needed --noconfirm git base-devel");
        assert_eq!(
            cmds[1],
            "runuser -u kod -- /bin/bash -c 'cd && git clone https://aur.archlinux.org/yay.git yay && cd yay && makepkg -si --noconfirm'"
        );
    }

    #[test]
    fn commands_go_through_the_helper() {
        let backend = backend();
        assert_eq!(
            backend
                .install_command(&["yay-bin".to_owned()])
                .unwrap(),
            "yay -S --needed --noconfirm yay-bin"
        );
        assert_eq!(
            backend.remove_command(&["spotify".to_owned()]).unwrap(),
            "yay -R --noconfirm spotify"
        );
        assert_eq!(backend.upgrade_command(&[]).unwrap(), "yay -Syu --noconfirm");
        assert_eq!(backend.refresh_command().unwrap(), "yay -Sy");
    }

    #[test]
    fn no_base_distribution_operations() {
        let backend = backend();
        assert!(backend
            .bootstrap_command(std::path::Path::new("/mnt"), &["base".to_owned()])
            .is_none());
        assert!(backend.kernel_file_command("linux").is_none());
        assert!(backend.list_installed_command().is_none());
    }
}
