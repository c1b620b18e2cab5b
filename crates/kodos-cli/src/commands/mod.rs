pub mod completions;
pub mod generations;
pub mod install;
pub mod rebuild;

use kodos_config::manifest::{parse_config_file, SystemConfig};
use kodos_core::CoreError;
use std::path::Path;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STATE_ERROR: u8 = 3;

pub fn load_config(path: &Path) -> Result<SystemConfig, CoreError> {
    Ok(parse_config_file(path)?)
}

/// Configuration problems and state problems get their own exit codes so
/// scripts can tell "fix your TOML" apart from "the store is broken".
pub fn exit_code_for(err: &CoreError) -> u8 {
    match err {
        CoreError::Config(_) | CoreError::Validation { .. } => EXIT_CONFIG_ERROR,
        CoreError::State(_) | CoreError::LockHeld(_) => EXIT_STATE_ERROR,
        _ => EXIT_FAILURE,
    }
}
