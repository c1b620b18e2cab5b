//! Snap packages from the snapcraft.io store.
//!
//! All packages in one declaration share the same confinement and channel;
//! declare a second snap repository for a different configuration.

use crate::backend::RepositoryBackend;
use crate::join_packages;

#[derive(Debug, Clone)]
pub struct SnapBackend {
    classic: bool,
    channel: Option<String>,
}

impl SnapBackend {
    pub fn new(classic: bool, channel: Option<String>) -> Self {
        Self { classic, channel }
    }

    fn flags(&self) -> String {
        let mut flags = Vec::new();
        if self.classic {
            flags.push("--classic".to_owned());
        }
        if let Some(channel) = &self.channel {
            flags.push(format!("--channel={channel}"));
        }
        flags.join(" ")
    }
}

impl RepositoryBackend for SnapBackend {
    fn name(&self) -> &str {
        "snap"
    }

    fn prepare(&self) -> Vec<String> {
        vec![
            "apt-get install -y --no-install-recommends snapd".to_owned(),
            "systemctl enable snapd.socket".to_owned(),
            "systemctl enable snapd.apparmor.service".to_owned(),
        ]
    }

    fn install_command(&self, packages: &[String]) -> Option<String> {
        let pkgs = join_packages(packages)?;
        let flags = self.flags();
        if flags.is_empty() {
            Some(format!("snap install {pkgs}"))
        } else {
            Some(format!("snap install {flags} {pkgs}"))
        }
    }

    fn remove_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| format!("snap remove {pkgs}"))
    }

    fn upgrade_command(&self, packages: &[String]) -> Option<String> {
        match join_packages(packages) {
            None => Some("snap refresh".to_owned()),
            Some(pkgs) => Some(format!("snap refresh {pkgs}")),
        }
    }

    fn refresh_command(&self) -> Option<String> {
        None
    }

    fn validate_commands(&self, packages: &[String]) -> Vec<String> {
        packages
            .iter()
            .map(|pkg| format!("snap info {pkg}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkgs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn prepare_installs_and_enables_snapd() {
        let cmds = SnapBackend::new(false, None).prepare();
        assert_eq!(
            cmds,
            vec![
                "apt-get install -y --no-install-recommends snapd",
                "systemctl enable snapd.socket",
                "systemctl enable snapd.apparmor.service",
            ]
        );
    }

    #[test]
    fn plain_install_has_no_flags() {
        let backend = SnapBackend::new(false, None);
        assert_eq!(
            backend
                .install_command(&pkgs(&["spotify", "discord"]))
                .unwrap(),
            "snap install spotify discord"
        );
    }

    #[test]
    fn classic_and_channel_flags() {
        let backend = SnapBackend::new(true, Some("beta".to_owned()));
        assert_eq!(
            backend.install_command(&pkgs(&["code"])).unwrap(),
            "snap install --classic --channel=beta code"
        );
    }

    #[test]
    fn empty_refresh_updates_all_snaps() {
        let backend = SnapBackend::new(false, None);
        assert_eq!(backend.upgrade_command(&[]).unwrap(), "snap refresh");
        assert_eq!(
            backend.upgrade_command(&pkgs(&["spotify"])).unwrap(),
            "snap refresh spotify"
        );
    }

    #[test]
    fn validation_queries_the_store() {
        let backend = SnapBackend::new(false, None);
        assert_eq!(
            backend.validate_commands(&pkgs(&["spotify"])),
            vec!["snap info spotify"]
        );
    }
}
