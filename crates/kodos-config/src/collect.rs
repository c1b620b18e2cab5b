//! Desired-state collection: a typed walk over the configuration tree.
//!
//! Each section contributes its package and service sets explicitly, so the
//! walk is a plain recursive descent over known types. Exclusions are applied
//! here, before diffing: the differ only ever sees "desired" vs "current".

use crate::manifest::SystemConfig;
use crate::packages::{PackageSet, RepoId};
use crate::ConfigError;
use std::collections::BTreeSet;

/// The fully collected target state for one install/rebuild pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub packages: PackageSet,
    pub services: BTreeSet<String>,
    /// Kernel metapackage from the boot section; resolved to a concrete
    /// version by the lifecycle before it lands in a record.
    pub kernel_package: String,
}

/// Walk the configuration and collect the desired package set, service set,
/// and kernel package. Desktop-environment extras, font packages, and user
/// program packages all land in the base repository's set; per-repository
/// package lists land in their declared repository's set.
pub fn desired_state(config: &SystemConfig) -> Result<DesiredState, ConfigError> {
    config.validate()?;
    let base = config.base_repository()?.id();

    let mut include = PackageSet::new();
    let mut exclude = PackageSet::new();
    let mut services = BTreeSet::new();

    for (repo_name, names) in &config.packages {
        include.add(&RepoId::new(repo_name.clone()), names.iter().cloned());
    }

    for desktop in &config.desktops {
        if !desktop.enable {
            continue;
        }
        include.add(&base, [desktop.name.clone(), desktop.display_manager.clone()]);
        include.add(&base, desktop.extra_packages.iter().cloned());
        exclude.add(&base, desktop.exclude_packages.iter().cloned());
        services.insert(desktop.display_manager.clone());
    }

    include.add(&base, config.fonts.packages.iter().cloned());

    for user in &config.users {
        include.add(&base, user.programs.iter().cloned());
    }

    for service in &config.services.enable {
        services.insert(service.clone());
    }
    if config.network.as_ref().is_some_and(|n| n.use_networkmanager) {
        include.add(&base, ["networkmanager".to_owned()]);
        services.insert("NetworkManager".to_owned());
    }

    let mut packages = include;
    for (repo, names) in exclude.iter() {
        packages.remove(repo, names.iter().map(String::as_str));
    }

    Ok(DesiredState {
        packages,
        services,
        kernel_package: config.boot.kernel.package.clone(),
    })
}
