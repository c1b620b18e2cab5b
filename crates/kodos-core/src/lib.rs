//! The KodOS engine.
//!
//! `install` produces generation 0 from an empty disk; `rebuild` diffs the
//! declared configuration against the current generation's record and
//! materializes the delta into a new generation, rolling back on failure.
//! Both run through the same differ and the same package-application code;
//! install is a rebuild against a synthetic empty record.

pub mod concurrency;
pub mod diff;
pub mod generations;
pub mod install;
pub mod kernel;
pub mod lifecycle;
pub mod mount;

pub use diff::{Diff, KernelChange, RepoDelta};
pub use install::InstallOrchestrator;
pub use lifecycle::{GenerationLifecycle, Phase, RebuildOptions, RebuildOutcome};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] kodos_config::ConfigError),
    #[error(transparent)]
    State(#[from] kodos_state::StateError),
    #[error(transparent)]
    Exec(#[from] kodos_exec::ExecError),
    /// Desired packages failed their backend existence checks. Raised before
    /// any install command is issued.
    #[error("package validation failed: {}", failures.join(", "))]
    Validation { failures: Vec<String> },
    #[error("failed to mount {target}")]
    Mount {
        target: PathBuf,
        #[source]
        source: kodos_exec::ExecError,
    },
    #[error("failed to unmount {target}")]
    Unmount {
        target: PathBuf,
        #[source]
        source: kodos_exec::ExecError,
    },
    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: lifecycle::Phase,
        to: lifecycle::Phase,
    },
    #[error("another install or rebuild pass holds the lock at {0}")]
    LockHeld(PathBuf),
    #[error("interrupted")]
    Interrupted,
    #[error("generation {0} is the current generation and cannot be removed")]
    RemoveCurrent(u32),
    #[error("generation {0} does not exist")]
    UnknownGeneration(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
