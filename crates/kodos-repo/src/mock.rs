//! Test backend with predictable command shapes.

use crate::backend::RepositoryBackend;
use crate::join_packages;
use std::path::Path;

/// Generates `mock-<name> <verb> ...` commands, so engine tests can assert
/// on ordering and content without depending on a real package manager.
#[derive(Debug, Clone)]
pub struct MockRepository {
    name: String,
    base: bool,
}

impl MockRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: false,
        }
    }

    /// A mock that also answers base distribution queries.
    pub fn base(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: true,
        }
    }

    fn cmd(&self, verb: &str, rest: &str) -> String {
        if rest.is_empty() {
            format!("mock-{} {verb}", self.name)
        } else {
            format!("mock-{} {verb} {rest}", self.name)
        }
    }
}

impl RepositoryBackend for MockRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self) -> Vec<String> {
        vec![self.cmd("prepare", "")]
    }

    fn install_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| self.cmd("install", &pkgs))
    }

    fn remove_command(&self, packages: &[String]) -> Option<String> {
        join_packages(packages).map(|pkgs| self.cmd("remove", &pkgs))
    }

    fn upgrade_command(&self, packages: &[String]) -> Option<String> {
        Some(self.cmd("upgrade", &join_packages(packages).unwrap_or_default()))
    }

    fn refresh_command(&self) -> Option<String> {
        Some(self.cmd("refresh", ""))
    }

    fn validate_commands(&self, packages: &[String]) -> Vec<String> {
        packages
            .iter()
            .map(|pkg| self.cmd("validate", pkg))
            .collect()
    }

    fn bootstrap_command(&self, mount_point: &Path, packages: &[String]) -> Option<String> {
        if !self.base {
            return None;
        }
        let pkgs = join_packages(packages)?;
        Some(self.cmd("bootstrap", &format!("{} {pkgs}", mount_point.display())))
    }

    fn kernel_file_command(&self, package: &str) -> Option<String> {
        self.base.then(|| self.cmd("kernel-file", package))
    }

    fn list_installed_command(&self) -> Option<String> {
        self.base.then(|| self.cmd("list-installed", ""))
    }
}
