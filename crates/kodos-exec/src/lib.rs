//! Command execution and dry-run plumbing for KodOS.
//!
//! Everything that touches the host system goes through two abstractions:
//! [`CommandRunner`] for shell commands (locally or inside a target root) and
//! [`FileSink`] for persisted writes. Both carry an explicit
//! [`ExecutionContext`] instead of process-wide mode globals, so dry-run,
//! debug, and verbose behavior is injected where it is needed and nowhere
//! else.

pub mod runner;
pub mod sink;

pub use runner::{CommandRunner, RecordingRunner, ShellRunner};
pub use sink::{DirectSink, FileSink, StagingSink};

use std::path::Path;
use thiserror::Error;

/// Execution mode flags, threaded by value through every component that runs
/// commands or writes files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Print commands and redirect writes to staging instead of executing.
    pub dry_run: bool,
    /// Like dry-run, but also intended for developer tracing.
    pub debug: bool,
    /// Echo every command before execution.
    pub verbose: bool,
}

impl ExecutionContext {
    pub fn new(dry_run: bool, debug: bool, verbose: bool) -> Self {
        Self {
            dry_run,
            debug,
            verbose,
        }
    }

    /// Whether commands and writes actually take effect.
    #[inline]
    pub fn is_effective(&self) -> bool {
        !(self.dry_run || self.debug)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command failed with {}: {cmd}", code.map_or_else(|| "unknown status".to_owned(), |c| format!("exit code {c}")))]
    CommandFailed {
        cmd: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}
