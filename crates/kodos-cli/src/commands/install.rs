use super::{load_config, EXIT_SUCCESS};
use kodos_core::{CoreError, InstallOrchestrator};
use kodos_exec::{CommandRunner, FileSink};
use std::path::Path;

pub fn run(
    config_path: &Path,
    runner: &dyn CommandRunner,
    sink: &dyn FileSink,
) -> Result<u8, CoreError> {
    let config = load_config(config_path)?;
    let id = InstallOrchestrator::new(&config, runner, sink)
        .with_config_source(config_path)
        .install()?;
    println!("generation {id} installed; reboot into the new system");
    Ok(EXIT_SUCCESS)
}
