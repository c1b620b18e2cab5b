//! Declarative configuration model for KodOS.
//!
//! This crate defines the read-only input consumed by the rebuild engine:
//! repository declarations, package/service/boot/locale/network/desktop/user
//! sections parsed from a TOML file, the `PackageSet` multimap that keeps
//! packages partitioned by repository, and the typed walk that collects the
//! desired system state out of the configuration tree.

pub mod collect;
pub mod manifest;
pub mod packages;

pub use collect::{desired_state, DesiredState};
pub use manifest::{
    parse_config_file, parse_config_str, BootSection, DesktopEnvironment, KernelSection,
    LoaderSection, LocaleSection, NetworkSection, Partition, RepositoryDecl, RepositoryKind,
    ServicesSection, SystemConfig, UserDecl,
};
pub use packages::{PackageSet, RepoId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("configuration declares no repositories")]
    NoRepositories,
    #[error("duplicate repository name: {0}")]
    DuplicateRepository(String),
    #[error("packages reference unknown repository: {0}")]
    UnknownRepository(String),
    #[error("configuration has no partition mounted at '/'")]
    MissingRootPartition,
}
