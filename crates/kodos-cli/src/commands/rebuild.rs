use super::{load_config, EXIT_SUCCESS};
use kodos_core::{CoreError, GenerationLifecycle, RebuildOptions};
use kodos_exec::{CommandRunner, FileSink};
use kodos_state::{GenerationLayout, StateStore};
use std::path::Path;

pub fn run(
    config_path: &Path,
    runner: &dyn CommandRunner,
    sink: &dyn FileSink,
    opts: &RebuildOptions,
) -> Result<u8, CoreError> {
    let config = load_config(config_path)?;
    let store = StateStore::new(GenerationLayout::new(&config.system.state_root));
    let outcome = GenerationLifecycle::new(&config, runner, sink, store).rebuild(opts)?;

    let installed: usize = outcome
        .diff
        .repos
        .values()
        .map(|delta| delta.to_install.len())
        .sum();
    let removed: usize = outcome
        .diff
        .repos
        .values()
        .map(|delta| delta.to_remove.len())
        .sum();
    println!(
        "generation {} committed ({installed} installed, {removed} removed)",
        outcome.generation
    );
    if let Some(change) = &outcome.diff.kernel_change {
        println!("kernel changed: {} -> {}", change.current, change.desired);
    }
    if outcome.reboot_required {
        println!("reboot to switch to generation {}", outcome.generation);
    } else {
        println!("switched live to generation {}", outcome.generation);
    }
    Ok(EXIT_SUCCESS)
}
