use super::{load_config, EXIT_SUCCESS};
use kodos_core::CoreError;
use kodos_exec::CommandRunner;
use kodos_state::{GenerationLayout, StateStore};
use std::path::Path;

fn store_for(config_path: &Path) -> Result<StateStore, CoreError> {
    let config = load_config(config_path)?;
    Ok(StateStore::new(GenerationLayout::new(
        &config.system.state_root,
    )))
}

pub fn list(config_path: &Path) -> Result<u8, CoreError> {
    let store = store_for(config_path)?;
    let infos = kodos_core::generations::list(&store, Path::new("/"))?;
    if infos.is_empty() {
        println!("no generations found");
    } else {
        println!("{:<6} {:<32} CURRENT", "GEN", "KERNEL");
        for info in &infos {
            println!(
                "{:<6} {:<32} {}",
                info.id,
                info.kernel.as_deref().unwrap_or("-"),
                if info.current { "*" } else { "" }
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn remove(config_path: &Path, runner: &dyn CommandRunner, id: u32) -> Result<u8, CoreError> {
    let store = store_for(config_path)?;
    kodos_core::generations::remove(&store, runner, Path::new("/"), id)?;
    println!("generation {id} removed");
    Ok(EXIT_SUCCESS)
}
