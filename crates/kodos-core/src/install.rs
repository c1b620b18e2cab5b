//! First install: generation 0 from an empty disk.
//!
//! Partitioning is external; the partition list and device paths are inputs.
//! Every step is fatal on failure with no automatic rollback, since there is
//! no prior generation to revert to; the half-installed system is left in
//! place for inspection. Package and service application reuse the rebuild
//! differ against a synthetic empty record, so both paths share one code
//! path.

use crate::concurrency::PassLock;
use crate::diff;
use crate::kernel;
use crate::lifecycle::{apply_package_diff, apply_service_diff, validate_packages};
use crate::mount::{partition_mount_command, MountStack};
use crate::CoreError;
use kodos_config::collect::desired_state;
use kodos_config::manifest::{Partition, SystemConfig};
use kodos_config::packages::RepoId;
use kodos_exec::{CommandRunner, FileSink};
use kodos_repo::{backend_for, RepositoryBackend};
use kodos_state::{boot, BootEntry, GenerationLayout, GenerationRecord, StateStore};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const OS_RELEASE: &str = r#"NAME="KodOS Linux"
VERSION="1.0"
PRETTY_NAME="KodOS Linux"
ID=kodos
ANSI_COLOR="38;2;23;147;209"
HOME_URL="https://github.com/kodos-prj/kodos/"
DOCUMENTATION_URL="https://github.com/kodos-prj/kodos/"
SUPPORT_URL="https://github.com/kodos-prj/kodos/"
"#;

const SYSTEM_SCHROOT: &str = "[system]\n\
type=directory\n\
description=KodOS\n\
directory=/\n\
groups=users,root\n\
root-groups=root,wheel\n\
profile=kodos\n\
personality=linux\n";

const VENV_SCHROOT: &str = "[virtual_env]\n\
type=directory\n\
description=KodOS\n\
directory=/\n\
union-type=overlay\n\
groups=users,root\n\
root-groups=root,wheel\n\
profile=kodos\n\
personality=linux\n\
aliases=user_env\n";

/// Installed during bootstrap alongside the kernel; everything else comes
/// through the regular package pass.
const ESSENTIAL_PACKAGES: &[&str] = &[
    "base",
    "base-devel",
    "btrfs-progs",
    "linux-firmware",
    "sudo",
    "dracut",
    "git",
];

pub struct InstallOrchestrator<'a> {
    config: &'a SystemConfig,
    runner: &'a dyn CommandRunner,
    sink: &'a dyn FileSink,
    backends: BTreeMap<RepoId, Box<dyn RepositoryBackend>>,
    /// Configuration file copied into the installed store for later rebuilds.
    config_source: Option<PathBuf>,
}

impl<'a> InstallOrchestrator<'a> {
    pub fn new(
        config: &'a SystemConfig,
        runner: &'a dyn CommandRunner,
        sink: &'a dyn FileSink,
    ) -> Self {
        let backends = config
            .repositories
            .iter()
            .map(|decl| (decl.id(), backend_for(decl)))
            .collect();
        Self {
            config,
            runner,
            sink,
            backends,
            config_source: None,
        }
    }

    #[must_use]
    pub fn with_backends(
        mut self,
        backends: BTreeMap<RepoId, Box<dyn RepositoryBackend>>,
    ) -> Self {
        self.backends = backends;
        self
    }

    #[must_use]
    pub fn with_config_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_source = Some(path.into());
        self
    }

    /// Run the full install. Returns the id of the new generation (0 on an
    /// empty disk).
    pub fn install(&self) -> Result<u32, CoreError> {
        let desired = desired_state(self.config)?;
        let root_partition = self.config.root_partition()?.clone();
        let mnt = PathBuf::from(&self.config.system.mount_point);
        let state_root = &self.config.system.state_root;
        let host_store = PathBuf::from(format!("{}{state_root}", mnt.display()));
        let store = StateStore::new(GenerationLayout::new(&host_store));

        let mut mounts = MountStack::new(self.runner);
        self.prepare_filesystem(&mut mounts, &root_partition, &mnt, &host_store)?;
        let _lock = PassLock::acquire(&store.layout().lock_file())?;
        let id = store.next_generation_id()?;
        info!("installing generation {id} at {}", mnt.display());

        // Everything the diff will install must exist before bootstrap.
        let empty = GenerationRecord::default();
        let diff = diff::compute(&empty, &desired);
        validate_packages(self.runner, &self.backends, &diff)?;

        let base = self.base_backend()?;
        let mut bootstrap: Vec<String> = ESSENTIAL_PACKAGES
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        bootstrap.push(desired.kernel_package.clone());
        if let Some(cmd) = base.bootstrap_command(&mnt, &bootstrap) {
            self.runner.run(&cmd)?;
        }

        self.write_fstab(&mnt)?;
        self.configure_system(&mnt)?;
        self.create_kod_user(&mnt)?;
        self.apply_locale(&mnt)?;
        self.apply_network(&mnt)?;

        // Boot loader and kernel staging before the package pass, so a
        // kernel pulled in by the bootstrap is immediately bootable.
        self.runner.run_in_root(&mnt, "bootctl install")?;
        let resolved = kernel::resolve(self.runner, &mnt, base, &desired.kernel_package)?;
        kernel::stage(self.runner, &mnt, &resolved, &self.config.boot.kernel.modules)?;

        apply_package_diff(self.runner, &self.backends, &mnt, &diff)?;
        apply_service_diff(self.runner, &mnt, &diff)?;
        self.create_users(&mnt)?;

        let boot_root = mnt.join("boot");
        let entry = BootEntry::new(
            id,
            resolved.version.clone(),
            root_partition.source.clone(),
            self.config.boot.loader.options.clone(),
        );
        boot::write_entry(self.sink, &boot_root, &entry, false)?;

        let record = GenerationRecord {
            kernel_package: resolved.record_string(&desired.kernel_package),
            packages_by_repository: desired.packages.to_sorted_lists(),
            enabled_services: desired.services.iter().cloned().collect(),
            versions_lock: match base.list_installed_command() {
                Some(cmd) => self.runner.capture_in_root(&mnt, &cmd)?,
                None => String::new(),
            },
        };
        store.save(self.sink, id, &record)?;
        store.write_marker(self.sink, &mnt, id)?;
        if let Err(e) = store.write_configuration(self.sink, id, self.config) {
            warn!("could not write configuration dump: {e}");
        }

        boot::write_entry(self.sink, &boot_root, &entry, true)?;
        boot::write_loader_conf(
            self.sink,
            &boot_root,
            "kodos.conf",
            self.config.boot.loader.timeout,
        )?;

        self.finalize(&host_store)?;
        mounts.unmount_all()?;
        info!("generation {id} installed");
        Ok(id)
    }

    /// Create the subvolume hierarchy on the target filesystem and mount the
    /// build root: top-level first to create subvolumes, then the generation
    /// rootfs, remaining partitions, home, and the store.
    fn prepare_filesystem(
        &self,
        mounts: &mut MountStack<'_>,
        root_partition: &Partition,
        mnt: &Path,
        host_store: &Path,
    ) -> Result<(), CoreError> {
        let src = &root_partition.source;
        let mnt_d = mnt.display();

        mounts.mount(&format!("mount {src} {mnt_d}"), mnt.to_path_buf())?;
        self.runner.run(&format!("mkdir -p {mnt_d}/generations/0"))?;
        self.runner
            .run(&format!("btrfs subvolume create {mnt_d}/generations/0/rootfs"))?;
        self.runner.run(&format!("mkdir -p {mnt_d}/store"))?;
        self.runner
            .run(&format!("btrfs subvolume create {mnt_d}/store/home"))?;
        mounts.unmount_all()?;

        mounts.mount(
            &format!("mount -o subvol=generations/0/rootfs {src} {mnt_d}"),
            mnt.to_path_buf(),
        )?;
        for part in self.config.partitions.iter().filter(|p| p.mount != "/") {
            self.runner
                .run(&format!("mkdir -p {mnt_d}{}", part.mount))?;
            mounts.mount(
                &partition_mount_command(part, mnt),
                format!("{mnt_d}{}", part.mount),
            )?;
        }
        self.runner.run(&format!("mkdir -p {mnt_d}/home"))?;
        mounts.mount(
            &format!("mount -o subvol=store/home {src} {mnt_d}/home"),
            mnt.join("home"),
        )?;
        self.runner
            .run(&format!("mkdir -p {}", host_store.display()))?;
        mounts.mount(
            &format!("mount {src} {}", host_store.display()),
            host_store.to_path_buf(),
        )?;
        Ok(())
    }

    /// fstab from the declared partition list, with `/dev/...` sources
    /// resolved to UUIDs so the entries survive device reordering.
    fn write_fstab(&self, mnt: &Path) -> Result<(), CoreError> {
        let mut fstab =
            String::from("# <file system> <mount point>   <type>  <options>       <dump>  <pass>\n");
        for part in &self.config.partitions {
            let mut part = part.clone();
            if part.source.starts_with("/dev/") {
                let uuid = self
                    .runner
                    .capture(&format!("lsblk -o UUID {} | tail -n 1", part.source))?;
                if !uuid.trim().is_empty() {
                    part.source = format!("UUID={}", uuid.trim());
                }
            }
            fstab.push_str(&part.to_string());
            fstab.push('\n');
        }
        self.sink.write(&mnt.join("etc/fstab"), &fstab)?;
        Ok(())
    }

    fn configure_system(&self, mnt: &Path) -> Result<(), CoreError> {
        self.sink.write(&mnt.join("etc/os-release"), OS_RELEASE)?;

        self.sink
            .write(&mnt.join("etc/schroot/chroot.d/system.conf"), SYSTEM_SCHROOT)?;
        self.sink
            .write(&mnt.join("etc/schroot/chroot.d/virtual_env.conf"), VENV_SCHROOT)?;
        self.sink.write(&mnt.join("etc/schroot/kodos/copyfiles"), "")?;
        self.sink
            .write(&mnt.join("etc/schroot/kodos/nssdatabases"), "")?;

        let mut venv_fstab =
            String::from("# <file system> <mount point>   <type>  <options>       <dump>  <pass>\n");
        for mpoint in [
            "/proc",
            "/sys",
            "/dev",
            "/dev/pts",
            "/home",
            "/root",
            "/tmp",
            "/run",
            "/var/cache",
            "/var/log",
            "/var/tmp",
            "/var/kod",
        ] {
            venv_fstab.push_str(&format!("{mpoint}\t{mpoint}\tnone\trw,bind\t0\t0\n"));
        }
        self.sink
            .write(&mnt.join("etc/schroot/kodos/fstab"), &venv_fstab)?;
        Ok(())
    }

    /// The fixed service account rebuilds run under inside the chroot
    /// (AUR helper builds, for one).
    fn create_kod_user(&self, mnt: &Path) -> Result<(), CoreError> {
        self.runner.run_in_root(
            mnt,
            "useradd -m -r -G wheel -s /bin/bash -d /var/kod/.home kod",
        )?;
        self.sink.write(
            &mnt.join("etc/sudoers.d/kod"),
            "kod ALL=(ALL) NOPASSWD: ALL\n",
        )?;
        Ok(())
    }

    fn apply_locale(&self, mnt: &Path) -> Result<(), CoreError> {
        let Some(locale) = &self.config.locale else {
            return Ok(());
        };
        let mut locale_gen = String::new();
        locale_gen.push_str(&locale.default);
        locale_gen.push('\n');
        for extra in &locale.additional {
            locale_gen.push_str(extra);
            locale_gen.push('\n');
        }
        self.sink.write(&mnt.join("etc/locale.gen"), &locale_gen)?;
        self.runner.run_in_root(mnt, "locale-gen")?;

        let lang = locale.default.split_whitespace().next().unwrap_or("C");
        self.sink
            .write(&mnt.join("etc/locale.conf"), &format!("LANG={lang}\n"))?;
        if let Some(keymap) = &locale.keymap {
            self.sink
                .write(&mnt.join("etc/vconsole.conf"), &format!("KEYMAP={keymap}\n"))?;
        }
        if let Some(tz) = &locale.timezone {
            self.runner.run_in_root(
                mnt,
                &format!("ln -sf /usr/share/zoneinfo/{tz} /etc/localtime"),
            )?;
        }
        Ok(())
    }

    fn apply_network(&self, mnt: &Path) -> Result<(), CoreError> {
        if let Some(network) = &self.config.network {
            self.sink.write(
                &mnt.join("etc/hostname"),
                &format!("{}\n", network.hostname),
            )?;
        }
        Ok(())
    }

    /// Configured user accounts. Dotfile deployment is each user's own
    /// concern; here they get an account, groups, and a shell.
    fn create_users(&self, mnt: &Path) -> Result<(), CoreError> {
        for user in &self.config.users {
            let mut cmd = format!("useradd -m {}", user.name);
            if !user.groups.is_empty() {
                cmd.push_str(&format!(" -G {}", user.groups.join(",")));
            }
            if let Some(shell) = &user.shell {
                cmd.push_str(&format!(" -s {shell}"));
            }
            self.runner.run_in_root(mnt, &cmd)?;
        }
        Ok(())
    }

    /// Copy the configuration into the installed store so the system can
    /// rebuild itself later.
    fn finalize(&self, host_store: &Path) -> Result<(), CoreError> {
        if let Some(source) = &self.config_source {
            let contents = fs::read_to_string(source)?;
            self.sink.write(&host_store.join("kodos.toml"), &contents)?;
        }
        Ok(())
    }

    fn base_backend(&self) -> Result<&dyn RepositoryBackend, CoreError> {
        let id = self.config.base_repository()?.id();
        self.backends
            .get(&id)
            .map(AsRef::as_ref)
            .ok_or_else(|| kodos_config::ConfigError::UnknownRepository(id.to_string()).into())
    }
}
