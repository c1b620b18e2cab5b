use crate::packages::RepoId;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Top-level declarative system configuration, parsed from `kodos.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SystemConfig {
    #[serde(default)]
    pub system: SystemSection,
    #[serde(rename = "repository", default)]
    pub repositories: Vec<RepositoryDecl>,
    #[serde(default)]
    pub boot: BootSection,
    #[serde(default)]
    pub locale: Option<LocaleSection>,
    #[serde(default)]
    pub network: Option<NetworkSection>,
    /// Per-repository package lists, keyed by declared repository name.
    #[serde(default)]
    pub packages: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub services: ServicesSection,
    #[serde(rename = "desktop", default)]
    pub desktops: Vec<DesktopEnvironment>,
    #[serde(default)]
    pub fonts: FontsSection,
    #[serde(rename = "user", default)]
    pub users: Vec<UserDecl>,
    #[serde(rename = "partition", default)]
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SystemSection {
    /// Root of the generation store on the installed system.
    #[serde(default = "default_state_root")]
    pub state_root: String,
    /// Mount point used while building the target system.
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            state_root: default_state_root(),
            mount_point: default_mount_point(),
        }
    }
}

fn default_state_root() -> String {
    "/kod".to_owned()
}

fn default_mount_point() -> String {
    "/mnt".to_owned()
}

/// A declared package repository. The `name` is the stable identity used to
/// correlate recorded state across generations; the `kind` selects the
/// backend that generates this repository's commands.
// No deny_unknown_fields here: the flattened kind enum consumes the tag
// and its payload fields, which serde would otherwise report as unknown.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepositoryDecl {
    pub name: String,
    #[serde(flatten)]
    pub kind: RepositoryKind,
    /// Marks the base distribution repository (bootstrap, kernel, lock).
    /// Defaults to the first declared repository when unset everywhere.
    #[serde(default)]
    pub base: bool,
}

impl RepositoryDecl {
    pub fn id(&self) -> RepoId {
        RepoId::new(self.name.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryKind {
    Arch {
        #[serde(default = "default_arch_mirror")]
        mirror_url: String,
    },
    Aur {
        helper: String,
        helper_url: String,
    },
    Debian {
        #[serde(default)]
        components: Vec<String>,
    },
    Ppa {
        ppa: String,
    },
    Flatpak {
        #[serde(default = "default_flatpak_remote")]
        remote: String,
        #[serde(default = "default_flatpak_remote_url")]
        remote_url: String,
    },
    Snap {
        /// Classic confinement: full system access, for IDEs and dev tools.
        #[serde(default)]
        classic: bool,
        /// Store channel to install from; `stable` when unset.
        #[serde(default)]
        channel: Option<String>,
    },
}

fn default_arch_mirror() -> String {
    "https://mirror.rackspace.com/archlinux/".to_owned()
}

fn default_flatpak_remote() -> String {
    "flathub".to_owned()
}

fn default_flatpak_remote_url() -> String {
    "https://dl.flathub.org/repo/flathub.flatpakrepo".to_owned()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BootSection {
    #[serde(default)]
    pub kernel: KernelSection,
    #[serde(default)]
    pub loader: LoaderSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KernelSection {
    #[serde(default = "default_kernel_package")]
    pub package: String,
    #[serde(default)]
    pub modules: Vec<String>,
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            package: default_kernel_package(),
            modules: Vec::new(),
        }
    }
}

fn default_kernel_package() -> String {
    "linux".to_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoaderSection {
    #[serde(rename = "type", default = "default_loader_type")]
    pub loader_type: String,
    #[serde(default = "default_loader_timeout")]
    pub timeout: u32,
    /// Extra kernel command-line options for the boot entry.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            loader_type: default_loader_type(),
            timeout: default_loader_timeout(),
            options: Vec::new(),
        }
    }
}

fn default_loader_type() -> String {
    "systemd-boot".to_owned()
}

fn default_loader_timeout() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocaleSection {
    pub default: String,
    #[serde(default)]
    pub additional: Vec<String>,
    #[serde(default)]
    pub keymap: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSection {
    pub hostname: String,
    #[serde(default)]
    pub use_networkmanager: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServicesSection {
    #[serde(default)]
    pub enable: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DesktopEnvironment {
    pub name: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_display_manager")]
    pub display_manager: String,
    #[serde(default)]
    pub extra_packages: Vec<String>,
    #[serde(default)]
    pub exclude_packages: Vec<String>,
}

fn default_display_manager() -> String {
    "gdm".to_owned()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FontsSection {
    #[serde(default)]
    pub packages: Vec<String>,
}

/// A configured user account. Account creation and dotfile deployment run
/// through the user's own install hook; the core only needs the program
/// package list and the name.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UserDecl {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub programs: Vec<String>,
}

/// One fstab entry. Partitioning itself is external; the core consumes the
/// list to generate fstab and locate the root device for boot entries.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Partition {
    pub source: String,
    pub mount: String,
    pub fstype: String,
    #[serde(default = "default_mount_options")]
    pub options: String,
    #[serde(default)]
    pub dump: u8,
    #[serde(default)]
    pub pass: u8,
}

fn default_mount_options() -> String {
    "defaults".to_owned()
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.source, self.mount, self.fstype, self.options, self.dump, self.pass
        )
    }
}

impl SystemConfig {
    /// The base distribution repository: the one marked `base = true`, or the
    /// first declared one.
    pub fn base_repository(&self) -> Result<&RepositoryDecl, ConfigError> {
        self.repositories
            .iter()
            .find(|r| r.base)
            .or_else(|| self.repositories.first())
            .ok_or(ConfigError::NoRepositories)
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryDecl> {
        self.repositories.iter().find(|r| r.name == name)
    }

    pub fn root_partition(&self) -> Result<&Partition, ConfigError> {
        self.partitions
            .iter()
            .find(|p| p.mount == "/")
            .ok_or(ConfigError::MissingRootPartition)
    }

    /// Structural checks run before anything mutates: repository names are
    /// unique, every packages entry references a declared repository, and at
    /// least one repository exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repositories.is_empty() {
            return Err(ConfigError::NoRepositories);
        }
        let mut seen = std::collections::BTreeSet::new();
        for repo in &self.repositories {
            if !seen.insert(repo.name.as_str()) {
                return Err(ConfigError::DuplicateRepository(repo.name.clone()));
            }
        }
        for name in self.packages.keys() {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::UnknownRepository(name.clone()));
            }
        }
        Ok(())
    }
}

pub fn parse_config_str(input: &str) -> Result<SystemConfig, ConfigError> {
    let config: SystemConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<SystemConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
