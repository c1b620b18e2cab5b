//! Generation records and their commit discipline.
//!
//! A record is persisted as three files: the verbatim version lock, the
//! enabled services list, and the installed-packages map. The map is written
//! last and doubles as the commit marker: a generation missing it (or the
//! services file) never becomes a diff baseline.

use crate::layout::GenerationLayout;
use crate::StateError;
use kodos_config::manifest::SystemConfig;
use kodos_exec::FileSink;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Key under which the resolved kernel package is recorded in the
/// installed-packages map, alongside the per-repository entries.
pub const KERNEL_KEY: &str = "kernel";

/// What one committed generation contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRecord {
    /// Version-resolved kernel package, not the metapackage name.
    pub kernel_package: String,
    /// Declared repository name to sorted package list.
    pub packages_by_repository: BTreeMap<String, Vec<String>>,
    pub enabled_services: Vec<String>,
    /// Verbatim output of the base backend's installed-versions listing.
    pub versions_lock: String,
}

/// Reads and writes generation records under a [`GenerationLayout`].
#[derive(Debug, Clone)]
pub struct StateStore {
    layout: GenerationLayout,
}

impl StateStore {
    pub fn new(layout: GenerationLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &GenerationLayout {
        &self.layout
    }

    /// Persist a record. Writes the lock and services first, the packages
    /// map last; readers treat the map as the commit marker, so a failure
    /// partway leaves the generation uncommitted rather than half-readable.
    pub fn save(
        &self,
        sink: &dyn FileSink,
        id: u32,
        record: &GenerationRecord,
    ) -> Result<(), StateError> {
        sink.write(&self.layout.packages_lock(id), &record.versions_lock)?;

        let mut services = record.enabled_services.join("\n");
        services.push('\n');
        sink.write(&self.layout.enabled_services(id), &services)?;

        let mut map: BTreeMap<String, Vec<String>> = record
            .packages_by_repository
            .iter()
            .map(|(repo, pkgs)| {
                let mut sorted = pkgs.clone();
                sorted.sort();
                (repo.clone(), sorted)
            })
            .collect();
        map.insert(KERNEL_KEY.to_owned(), vec![record.kernel_package.clone()]);
        let json = serde_json::to_string_pretty(&map).map_err(|source| StateError::Malformed {
            path: self.layout.installed_packages(id),
            source,
        })?;
        sink.write(&self.layout.installed_packages(id), &json)?;
        Ok(())
    }

    /// Load the record of generation `id`. A missing packages map or
    /// services file means the generation was never committed.
    pub fn load(&self, id: u32) -> Result<GenerationRecord, StateError> {
        let packages_path = self.layout.installed_packages(id);
        let services_path = self.layout.enabled_services(id);
        if !packages_path.is_file() || !services_path.is_file() {
            return Err(StateError::MissingState(self.layout.generation_dir(id)));
        }

        let raw = fs::read_to_string(&packages_path)?;
        let mut map: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&raw).map_err(|source| StateError::Malformed {
                path: packages_path.clone(),
                source,
            })?;
        let kernel_package = map
            .remove(KERNEL_KEY)
            .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) })
            .ok_or(StateError::MissingState(self.layout.generation_dir(id)))?;

        let enabled_services = fs::read_to_string(&services_path)?
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        // The lock is informational; absence is tolerated on load.
        let versions_lock = fs::read_to_string(self.layout.packages_lock(id)).unwrap_or_default();

        Ok(GenerationRecord {
            kernel_package,
            packages_by_repository: map,
            enabled_services,
            versions_lock,
        })
    }

    /// All generation ids on disk, sorted ascending. Stray entries under the
    /// generations directory are skipped with a warning rather than failing
    /// the whole listing.
    pub fn list_generations(&self) -> Result<Vec<u32>, StateError> {
        let dir = self.layout.generations_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            match name.to_string_lossy().parse::<u32>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!("skipping stray entry in {}: {:?}", dir.display(), name),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn next_generation_id(&self) -> Result<u32, StateError> {
        Ok(self
            .list_generations()?
            .last()
            .map_or(0, |last| last + 1))
    }

    /// Write the generation-id marker inside a rootfs (usually the build
    /// mount point while the generation is under construction).
    pub fn write_marker(
        &self,
        sink: &dyn FileSink,
        rootfs_root: &Path,
        id: u32,
    ) -> Result<(), StateError> {
        sink.write(&GenerationLayout::marker(rootfs_root), &format!("{id}\n"))?;
        Ok(())
    }

    /// Generation id recorded inside a rootfs, if any.
    pub fn read_marker(rootfs_root: &Path) -> Option<u32> {
        fs::read_to_string(GenerationLayout::marker(rootfs_root))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Best-effort dump of the configuration that produced generation `id`.
    /// Written for inspection only, never read back.
    pub fn write_configuration(
        &self,
        sink: &dyn FileSink,
        id: u32,
        config: &SystemConfig,
    ) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(config).map_err(|source| StateError::Malformed {
            path: self.layout.configuration(id),
            source,
        })?;
        sink.write(&self.layout.configuration(id), &json)?;
        Ok(())
    }
}
