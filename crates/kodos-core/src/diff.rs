//! Configuration diffing: desired state against the current generation's
//! record. The differ has no notion of "excluded" packages; exclusions are
//! resolved by the configuration walk before it runs.

use kodos_config::collect::DesiredState;
use kodos_config::packages::RepoId;
use kodos_state::GenerationRecord;
use std::collections::{BTreeMap, BTreeSet};

/// Per-repository package delta. Both lists are sorted; they are disjoint by
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoDelta {
    pub to_install: Vec<String>,
    pub to_remove: Vec<String>,
}

impl RepoDelta {
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelChange {
    pub current: String,
    pub desired: String,
}

/// Everything a rebuild has to apply. Repositories with empty deltas are
/// absent, so iterating the map never triggers a needless `prepare`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub repos: BTreeMap<RepoId, RepoDelta>,
    pub services_to_enable: Vec<String>,
    pub services_to_disable: Vec<String>,
    pub kernel_change: Option<KernelChange>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
            && self.services_to_enable.is_empty()
            && self.services_to_disable.is_empty()
            && self.kernel_change.is_none()
    }
}

/// Package and service deltas between the current record and the desired
/// state. The kernel delta is decided separately (see [`kernel_delta`])
/// because the desired kernel can only be version-resolved once it is
/// present in the new root.
pub fn compute(current: &GenerationRecord, desired: &DesiredState) -> Diff {
    let mut repos = BTreeMap::new();

    for (repo, desired_set) in desired.packages.iter() {
        let current_set: BTreeSet<String> = current
            .packages_by_repository
            .get(repo.as_str())
            .map(|pkgs| pkgs.iter().cloned().collect())
            .unwrap_or_default();
        let delta = RepoDelta {
            to_install: desired_set.difference(&current_set).cloned().collect(),
            to_remove: current_set.difference(desired_set).cloned().collect(),
        };
        if !delta.is_empty() {
            repos.insert(repo.clone(), delta);
        }
    }

    // Repositories recorded previously but no longer declared lose all of
    // their packages.
    for (name, pkgs) in &current.packages_by_repository {
        let repo = RepoId::new(name.clone());
        if desired.packages.get(&repo).is_none() && !pkgs.is_empty() {
            let mut to_remove = pkgs.clone();
            to_remove.sort();
            repos.insert(
                repo,
                RepoDelta {
                    to_install: Vec::new(),
                    to_remove,
                },
            );
        }
    }

    let current_services: BTreeSet<&str> =
        current.enabled_services.iter().map(String::as_str).collect();
    let desired_services: BTreeSet<&str> =
        desired.services.iter().map(String::as_str).collect();

    Diff {
        repos,
        services_to_enable: desired_services
            .difference(&current_services)
            .map(|s| (*s).to_owned())
            .collect(),
        services_to_disable: current_services
            .difference(&desired_services)
            .map(|s| (*s).to_owned())
            .collect(),
        kernel_change: None,
    }
}

/// Kernel delta between two version-resolved kernel strings.
pub fn kernel_delta(current: &str, desired_resolved: &str) -> Option<KernelChange> {
    (current != desired_resolved).then(|| KernelChange {
        current: current.to_owned(),
        desired: desired_resolved.to_owned(),
    })
}
