//! Durable generation state.
//!
//! A generation is a numbered directory under `<state_root>/generations/`
//! holding a btrfs rootfs subvolume and the record files that describe what
//! was installed into it. The record is the diff baseline for the next
//! rebuild; a generation without one is treated as never committed.

pub mod boot;
pub mod layout;
pub mod record;

pub use boot::BootEntry;
pub use layout::GenerationLayout;
pub use record::{GenerationRecord, StateStore};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// The generation has a rootfs but no readable record. Nothing is
    /// diffable against it.
    #[error("no generation record in {0}")]
    MissingState(PathBuf),
    #[error("malformed generation record in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Exec(#[from] kodos_exec::ExecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
