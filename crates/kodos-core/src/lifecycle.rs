//! The rebuild state machine.
//!
//! A rebuild runs a non-destructive prelude (load the current record, collect
//! desired state, diff, validate) and only then starts mutating: snapshot,
//! mount, apply packages and services, write the boot entry, persist the
//! record, unmount. Any failure after the snapshot exists triggers rollback,
//! which removes every trace of the attempted generation and leaves the
//! previous one untouched.

use crate::concurrency::{shutdown_requested, PassLock};
use crate::diff::{self, Diff};
use crate::kernel;
use crate::mount::{partition_mount_command, MountStack};
use crate::CoreError;
use kodos_config::collect::{desired_state, DesiredState};
use kodos_config::manifest::SystemConfig;
use kodos_config::packages::RepoId;
use kodos_exec::{CommandRunner, FileSink};
use kodos_repo::{backend_for, RepositoryBackend};
use kodos_state::{boot, BootEntry, GenerationLayout, GenerationRecord, StateStore};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SnapshotCreated,
    RootMounted,
    PackagesApplied,
    ServicesApplied,
    BootEntryWritten,
    Committed,
    Failed,
    RolledBack,
}

pub fn validate_transition(from: Phase, to: Phase) -> bool {
    use Phase::{
        BootEntryWritten, Committed, Failed, Idle, PackagesApplied, RolledBack, RootMounted,
        ServicesApplied, SnapshotCreated,
    };
    matches!(
        (from, to),
        (Idle, SnapshotCreated)
            | (SnapshotCreated, RootMounted)
            | (RootMounted, PackagesApplied)
            | (PackagesApplied, ServicesApplied)
            | (ServicesApplied, BootEntryWritten)
            | (BootEntryWritten, Committed)
            | (
                SnapshotCreated | RootMounted | PackagesApplied | ServicesApplied
                    | BootEntryWritten,
                Failed,
            )
            | (Failed, RolledBack)
    )
}

fn advance(phase: &mut Phase, to: Phase) -> Result<(), CoreError> {
    if !validate_transition(*phase, to) {
        return Err(CoreError::InvalidTransition { from: *phase, to });
    }
    *phase = to;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    /// Refresh databases and upgrade carried-over packages inside the new
    /// root before applying the diff.
    pub upgrade: bool,
    /// Switch into the new generation without a reboot where possible.
    pub live_switch: bool,
    /// Reboot after a successful commit.
    pub reboot: bool,
}

#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    pub generation: u32,
    pub diff: Diff,
    pub kernel_changed: bool,
    pub reboot_required: bool,
}

pub struct GenerationLifecycle<'a> {
    config: &'a SystemConfig,
    runner: &'a dyn CommandRunner,
    sink: &'a dyn FileSink,
    store: StateStore,
    backends: BTreeMap<RepoId, Box<dyn RepositoryBackend>>,
    live_root: PathBuf,
}

impl<'a> GenerationLifecycle<'a> {
    pub fn new(
        config: &'a SystemConfig,
        runner: &'a dyn CommandRunner,
        sink: &'a dyn FileSink,
        store: StateStore,
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
            store,
            backends,
            live_root: PathBuf::from("/"),
        }
    }

    /// Replace the configured backends, for tests.
    #[must_use]
    pub fn with_backends(
        mut self,
        backends: BTreeMap<RepoId, Box<dyn RepositoryBackend>>,
    ) -> Self {
        self.backends = backends;
        self
    }

    /// Root of the currently running system; `/` outside of tests.
    #[must_use]
    pub fn with_live_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.live_root = root.into();
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Build a new generation from the declared configuration.
    pub fn rebuild(&self, opts: &RebuildOptions) -> Result<RebuildOutcome, CoreError> {
        let _lock = PassLock::acquire(&self.store.layout().lock_file())?;

        // Non-destructive prelude. Errors here abort with nothing to clean.
        let desired = desired_state(self.config)?;
        let current_id = self.current_generation()?;
        let current = self.store.load(current_id)?;
        let mut diff = diff::compute(&current, &desired);
        self.validate(&diff)?;

        let id = self.store.next_generation_id()?;
        info!("building generation {id} from generation {current_id}");

        let mut phase = Phase::Idle;
        let mut mounts = MountStack::new(self.runner);
        match self.build(opts, &desired, &current, &mut diff, id, &mut phase, &mut mounts) {
            Ok(outcome) => Ok(outcome),
            Err(cause) => match phase {
                // Snapshot was never created; nothing to clean.
                Phase::Idle => Err(cause),
                // The record and default entry are already persisted; a
                // failed post-commit step must not unwind the generation.
                Phase::Committed => {
                    error!(
                        "generation {id} is committed, but a post-commit step \
                         failed: {cause}"
                    );
                    Err(cause)
                }
                _ => {
                    let _ = advance(&mut phase, Phase::Failed);
                    self.rollback(id, &mut mounts);
                    let _ = advance(&mut phase, Phase::RolledBack);
                    error!(
                        "rebuild of generation {id} failed: {cause}; \
                         generation {current_id} remains the default boot entry"
                    );
                    Err(cause)
                }
            },
        }
    }

    #[allow(clippy::too_many_lines)]
    fn build(
        &self,
        opts: &RebuildOptions,
        desired: &DesiredState,
        current: &GenerationRecord,
        diff: &mut Diff,
        id: u32,
        phase: &mut Phase,
        mounts: &mut MountStack<'_>,
    ) -> Result<RebuildOutcome, CoreError> {
        let layout = self.store.layout();
        let root_partition = self.config.root_partition()?;

        self.sink.create_dir_all(&layout.generation_dir(id))?;
        self.runner.run(&format!(
            "btrfs subvolume snapshot {} {}",
            self.live_root.display(),
            layout.rootfs(id).display()
        ))?;
        advance(phase, Phase::SnapshotCreated)?;
        self.checkpoint()?;

        let mnt = PathBuf::from(&self.config.system.mount_point);
        mounts.mount(
            &format!(
                "mount -o subvol={} {} {}",
                GenerationLayout::subvolume(id),
                root_partition.source,
                mnt.display()
            ),
            mnt.clone(),
        )?;
        for part in self.config.partitions.iter().filter(|p| p.mount != "/") {
            mounts.mount(
                &partition_mount_command(part, &mnt),
                format!("{}{}", mnt.display(), part.mount),
            )?;
        }
        // Shared home lives on its own subvolume outside the snapshot.
        mounts.mount(
            &format!(
                "mount -o subvol=store/home {} {}/home",
                root_partition.source,
                mnt.display()
            ),
            mnt.join("home"),
        )?;
        // Bind the generation store so the chrooted system sees it.
        let state_root = &self.config.system.state_root;
        let bind_target = format!("{}{state_root}", mnt.display());
        mounts.mount(
            &format!("mount --bind {state_root} {bind_target}"),
            bind_target,
        )?;
        advance(phase, Phase::RootMounted)?;
        self.checkpoint()?;

        if opts.upgrade {
            self.upgrade_pass(&mnt, current, desired)?;
        }
        self.apply_packages(&mnt, diff)?;

        let base = self.base_backend()?;
        let resolved = kernel::resolve(self.runner, &mnt, base, &desired.kernel_package)?;
        let resolved_str = resolved.record_string(&desired.kernel_package);
        diff.kernel_change = diff::kernel_delta(&current.kernel_package, &resolved_str);
        if diff.kernel_change.is_some() {
            kernel::stage(self.runner, &mnt, &resolved, &self.config.boot.kernel.modules)?;
        }
        advance(phase, Phase::PackagesApplied)?;
        self.checkpoint()?;

        self.apply_services(&mnt, diff)?;
        advance(phase, Phase::ServicesApplied)?;
        self.checkpoint()?;

        let boot_root = mnt.join("boot");
        let entry = BootEntry::new(
            id,
            resolved.version.clone(),
            root_partition.source.clone(),
            self.config.boot.loader.options.clone(),
        );
        boot::write_entry(self.sink, &boot_root, &entry, false)?;
        advance(phase, Phase::BootEntryWritten)?;
        self.checkpoint()?;

        let record = GenerationRecord {
            kernel_package: resolved_str,
            packages_by_repository: desired.packages.to_sorted_lists(),
            enabled_services: desired.services.iter().cloned().collect(),
            versions_lock: match base.list_installed_command() {
                Some(cmd) => self.runner.capture_in_root(&mnt, &cmd)?,
                None => String::new(),
            },
        };
        self.store.save(self.sink, id, &record)?;
        self.store.write_marker(self.sink, &mnt, id)?;
        if let Err(e) = self.store.write_configuration(self.sink, id, self.config) {
            warn!("could not write configuration dump for generation {id}: {e}");
        }

        // Only now, with the record committed, may the default entry point
        // at the new generation.
        boot::write_entry(self.sink, &boot_root, &entry, true)?;
        boot::write_loader_conf(
            self.sink,
            &boot_root,
            "kodos.conf",
            self.config.boot.loader.timeout,
        )?;

        // The record is committed; a stuck build mount must not unwind the
        // generation, so teardown is best-effort from here.
        mounts.unmount_best_effort();
        advance(phase, Phase::Committed)?;

        let kernel_changed = diff.kernel_change.is_some();
        let reboot_required = if opts.live_switch { kernel_changed } else { true };
        if opts.live_switch && !kernel_changed {
            // The new root carries the same kernel; service changes can take
            // effect on the running system immediately.
            self.switch_live_services(diff)?;
        }
        info!("generation {id} committed");
        if opts.reboot {
            self.runner.run("systemctl reboot")?;
        }
        Ok(RebuildOutcome {
            generation: id,
            diff: diff.clone(),
            kernel_changed,
            reboot_required,
        })
    }

    /// Refresh databases and upgrade packages present in both the current
    /// record and the desired state, so upgrades and new installs land in
    /// the same generation.
    fn upgrade_pass(
        &self,
        mnt: &Path,
        current: &GenerationRecord,
        desired: &DesiredState,
    ) -> Result<(), CoreError> {
        for (repo_id, backend) in &self.backends {
            if let Some(cmd) = backend.refresh_command() {
                self.runner.run_in_root(mnt, &cmd)?;
            }
            let carried: Vec<String> = match (
                current.packages_by_repository.get(repo_id.as_str()),
                desired.packages.get(repo_id),
            ) {
                (Some(recorded), Some(wanted)) => recorded
                    .iter()
                    .filter(|pkg| wanted.contains(*pkg))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            if carried.is_empty() {
                continue;
            }
            if let Some(cmd) = backend.upgrade_command(&carried) {
                self.runner.run_in_root(mnt, &cmd)?;
            }
        }
        Ok(())
    }

    fn apply_packages(&self, mnt: &Path, diff: &Diff) -> Result<(), CoreError> {
        apply_package_diff(self.runner, &self.backends, mnt, diff)
    }

    fn apply_services(&self, mnt: &Path, diff: &Diff) -> Result<(), CoreError> {
        apply_service_diff(self.runner, mnt, diff)
    }

    fn switch_live_services(&self, diff: &Diff) -> Result<(), CoreError> {
        for service in &diff.services_to_enable {
            self.runner.run(&format!("systemctl enable --now {service}"))?;
        }
        for service in &diff.services_to_disable {
            self.runner.run(&format!("systemctl disable --now {service}"))?;
        }
        Ok(())
    }

    fn validate(&self, diff: &Diff) -> Result<(), CoreError> {
        validate_packages(self.runner, &self.backends, diff)
    }

    /// The id of the currently running generation: the rootfs marker when
    /// present, otherwise the newest generation with a readable record.
    fn current_generation(&self) -> Result<u32, CoreError> {
        if let Some(id) = StateStore::read_marker(&self.live_root) {
            return Ok(id);
        }
        for id in self.store.list_generations()?.into_iter().rev() {
            if self.store.load(id).is_ok() {
                return Ok(id);
            }
        }
        Err(kodos_state::StateError::MissingState(self.store.layout().generations_dir()).into())
    }

    fn base_backend(&self) -> Result<&dyn RepositoryBackend, CoreError> {
        let id = self.config.base_repository()?.id();
        self.backends
            .get(&id)
            .map(AsRef::as_ref)
            .ok_or_else(|| kodos_config::ConfigError::UnknownRepository(id.to_string()).into())
    }

    fn checkpoint(&self) -> Result<(), CoreError> {
        if shutdown_requested() {
            Err(CoreError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Best-effort removal of every trace of the attempted generation.
    /// Never raises past its own boundary.
    fn rollback(&self, id: u32, mounts: &mut MountStack<'_>) {
        warn!("rolling back generation {id}");
        mounts.unmount_best_effort();
        let rootfs = self.store.layout().rootfs(id);
        if let Err(e) = self
            .runner
            .run(&format!("btrfs subvolume delete {}", rootfs.display()))
        {
            warn!("could not delete subvolume {}: {e}", rootfs.display());
        }
        let dir = self.store.layout().generation_dir(id);
        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("could not remove {}: {e}", dir.display());
            }
        }
        if let Err(e) = boot::remove_entry(&self.live_root.join("boot"), id) {
            warn!("could not remove boot entry for generation {id}: {e}");
        }
    }
}

/// Per-repository diff application: `prepare` once for repositories that
/// install something, then install, then remove. Shared by rebuild and
/// first install.
pub(crate) fn apply_package_diff(
    runner: &dyn CommandRunner,
    backends: &BTreeMap<RepoId, Box<dyn RepositoryBackend>>,
    mnt: &Path,
    diff: &Diff,
) -> Result<(), CoreError> {
    for (repo_id, delta) in &diff.repos {
        let Some(backend) = backends.get(repo_id) else {
            warn!(
                "repository {repo_id} is no longer declared; cannot remove {:?}",
                delta.to_remove
            );
            continue;
        };
        if !delta.to_install.is_empty() {
            for cmd in backend.prepare() {
                runner.run_in_root(mnt, &cmd)?;
            }
        }
        if let Some(cmd) = backend.install_command(&delta.to_install) {
            runner.run_in_root(mnt, &cmd)?;
        }
        if let Some(cmd) = backend.remove_command(&delta.to_remove) {
            runner.run_in_root(mnt, &cmd)?;
        }
    }
    Ok(())
}

pub(crate) fn apply_service_diff(
    runner: &dyn CommandRunner,
    mnt: &Path,
    diff: &Diff,
) -> Result<(), CoreError> {
    for service in &diff.services_to_enable {
        runner.run_in_root(mnt, &format!("systemctl enable {service}"))?;
    }
    for service in &diff.services_to_disable {
        runner.run_in_root(mnt, &format!("systemctl disable {service}"))?;
    }
    Ok(())
}

/// Backend existence checks for every package about to be installed. Fatal
/// before any install command is issued.
pub(crate) fn validate_packages(
    runner: &dyn CommandRunner,
    backends: &BTreeMap<RepoId, Box<dyn RepositoryBackend>>,
    diff: &Diff,
) -> Result<(), CoreError> {
    let mut failures = Vec::new();
    for (repo_id, delta) in &diff.repos {
        let Some(backend) = backends.get(repo_id) else {
            continue;
        };
        for cmd in backend.validate_commands(&delta.to_install) {
            if runner.run(&cmd).is_err() {
                let pkg = cmd.split_whitespace().last().unwrap_or(cmd.as_str());
                failures.push(format!("{repo_id}/{pkg}"));
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_valid() {
        use Phase::{
            BootEntryWritten, Committed, Idle, PackagesApplied, RootMounted, ServicesApplied,
            SnapshotCreated,
        };
        let order = [
            Idle,
            SnapshotCreated,
            RootMounted,
            PackagesApplied,
            ServicesApplied,
            BootEntryWritten,
            Committed,
        ];
        for pair in order.windows(2) {
            assert!(validate_transition(pair[0], pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn failure_is_reachable_from_mutating_phases_only() {
        assert!(!validate_transition(Phase::Idle, Phase::Failed));
        assert!(!validate_transition(Phase::Committed, Phase::Failed));
        for from in [
            Phase::SnapshotCreated,
            Phase::RootMounted,
            Phase::PackagesApplied,
            Phase::ServicesApplied,
            Phase::BootEntryWritten,
        ] {
            assert!(validate_transition(from, Phase::Failed), "{from:?}");
        }
        assert!(validate_transition(Phase::Failed, Phase::RolledBack));
    }

    #[test]
    fn skipping_phases_is_invalid() {
        assert!(!validate_transition(Phase::Idle, Phase::RootMounted));
        assert!(!validate_transition(Phase::SnapshotCreated, Phase::Committed));
        assert!(!validate_transition(Phase::Committed, Phase::Idle));
    }
}
