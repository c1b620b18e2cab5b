//! Generation maintenance: listing and removal.

use crate::CoreError;
use kodos_exec::CommandRunner;
use kodos_state::{boot, StateStore};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
    pub id: u32,
    /// Recorded kernel, when the record is readable.
    pub kernel: Option<String>,
    pub current: bool,
}

/// All generations on disk with whatever metadata their records yield.
/// Unreadable records are reported per entry, never failing the listing.
pub fn list(store: &StateStore, live_root: &Path) -> Result<Vec<GenerationInfo>, CoreError> {
    let current = StateStore::read_marker(live_root);
    let mut out = Vec::new();
    for id in store.list_generations()? {
        let kernel = match store.load(id) {
            Ok(record) => Some(record.kernel_package),
            Err(e) => {
                warn!("generation {id} has no readable record: {e}");
                None
            }
        };
        out.push(GenerationInfo {
            id,
            kernel,
            current: current == Some(id),
        });
    }
    Ok(out)
}

/// Delete a generation: its boot entry, its subvolume, and its directory.
/// The current generation is refused.
pub fn remove(
    store: &StateStore,
    runner: &dyn CommandRunner,
    live_root: &Path,
    id: u32,
) -> Result<(), CoreError> {
    if StateStore::read_marker(live_root) == Some(id) {
        return Err(CoreError::RemoveCurrent(id));
    }
    if !store.list_generations()?.contains(&id) {
        return Err(CoreError::UnknownGeneration(id));
    }

    boot::remove_entry(&live_root.join("boot"), id)?;
    let rootfs = store.layout().rootfs(id);
    if rootfs.exists() {
        runner.run(&format!("btrfs subvolume delete {}", rootfs.display()))?;
    }
    fs::remove_dir_all(store.layout().generation_dir(id))?;
    info!("generation {id} removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodos_exec::{DirectSink, RecordingRunner};
    use kodos_state::{GenerationLayout, GenerationRecord};

    fn store(root: &Path) -> StateStore {
        StateStore::new(GenerationLayout::new(root))
    }

    fn commit(store: &StateStore, id: u32, kernel: &str) {
        let record = GenerationRecord {
            kernel_package: kernel.to_owned(),
            ..GenerationRecord::default()
        };
        store.save(&DirectSink, id, &record).unwrap();
    }

    #[test]
    fn lists_generations_with_recorded_kernels() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        commit(&store, 0, "linux 6.11.0");
        commit(&store, 1, "linux 6.12.1");
        // A rootfs-only generation still shows up, without metadata.
        fs::create_dir_all(store.layout().generation_dir(2)).unwrap();

        let live = tempfile::tempdir().unwrap();
        store.write_marker(&DirectSink, live.path(), 1).unwrap();

        let infos = list(&store, live.path()).unwrap();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].kernel.as_deref(), Some("linux 6.11.0"));
        assert!(infos[1].current);
        assert!(infos[2].kernel.is_none());
    }

    #[test]
    fn refuses_to_remove_the_current_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        commit(&store, 0, "linux 6.12.1");
        let live = tempfile::tempdir().unwrap();
        store.write_marker(&DirectSink, live.path(), 0).unwrap();

        let runner = RecordingRunner::new();
        let err = remove(&store, &runner, live.path(), 0).unwrap_err();
        assert!(matches!(err, CoreError::RemoveCurrent(0)));
        assert!(runner.trace().is_empty());
    }

    #[test]
    fn removing_an_unknown_generation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let live = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        assert!(matches!(
            remove(&store, &runner, live.path(), 9).unwrap_err(),
            CoreError::UnknownGeneration(9)
        ));
    }

    #[test]
    fn remove_deletes_directory_and_subvolume() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        commit(&store, 0, "linux 6.11.0");
        commit(&store, 3, "linux 6.12.1");
        fs::create_dir_all(store.layout().rootfs(3)).unwrap();
        let live = tempfile::tempdir().unwrap();
        store.write_marker(&DirectSink, live.path(), 0).unwrap();

        let runner = RecordingRunner::new();
        remove(&store, &runner, live.path(), 3).unwrap();
        assert!(!store.layout().generation_dir(3).exists());
        assert!(runner
            .trace()
            .iter()
            .any(|c| c.contains("btrfs subvolume delete")));
        assert_eq!(store.list_generations().unwrap(), vec![0]);
    }
}
