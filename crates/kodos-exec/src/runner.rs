use crate::{ExecError, ExecutionContext};
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use tracing::{debug, info};

/// Abstract "run a shell command, optionally inside a target root, optionally
/// capturing output" primitive the engine is written against.
pub trait CommandRunner {
    fn run(&self, cmd: &str) -> Result<(), ExecError>;

    /// Run inside the target root via chroot. Commands against a generation
    /// under construction always go through this.
    fn run_in_root(&self, root: &Path, cmd: &str) -> Result<(), ExecError>;

    fn capture(&self, cmd: &str) -> Result<String, ExecError>;

    fn capture_in_root(&self, root: &Path, cmd: &str) -> Result<String, ExecError>;
}

/// Real runner: `sh -c` locally, `chroot <root> sh -c` for target-root work.
pub struct ShellRunner {
    ctx: ExecutionContext,
}

impl ShellRunner {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    fn announce(&self, prefix: &str, cmd: &str) {
        if self.ctx.verbose || self.ctx.debug {
            info!("{prefix}{cmd}");
        } else {
            debug!("{prefix}{cmd}");
        }
    }

    // Not named `display`: tracing macros resolve that identifier to
    // `tracing::field::display` instead of the local.
    fn execute(&self, mut command: Command, shown: &str) -> Result<(), ExecError> {
        if !self.ctx.is_effective() {
            info!("[dry-run] {shown}");
            return Ok(());
        }
        let status = command.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecError::CommandFailed {
                cmd: shown.to_owned(),
                code: status.code(),
                stderr: String::new(),
            })
        }
    }

    fn execute_capture(&self, mut command: Command, shown: &str) -> Result<String, ExecError> {
        if !self.ctx.is_effective() {
            info!("[dry-run] {shown}");
            return Ok(String::new());
        }
        let output = command.output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(ExecError::CommandFailed {
                cmd: shown.to_owned(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    fn shell(cmd: &str) -> Command {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }

    fn chroot_shell(root: &Path, cmd: &str) -> Command {
        let mut c = Command::new("chroot");
        c.arg(root).arg("/bin/sh").arg("-c").arg(cmd);
        c
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, cmd: &str) -> Result<(), ExecError> {
        self.announce(">> ", cmd);
        self.execute(Self::shell(cmd), cmd)
    }

    fn run_in_root(&self, root: &Path, cmd: &str) -> Result<(), ExecError> {
        let display = format!("({}) {cmd}", root.display());
        self.announce(">> ", &display);
        self.execute(Self::chroot_shell(root, cmd), &display)
    }

    fn capture(&self, cmd: &str) -> Result<String, ExecError> {
        self.announce(">> ", cmd);
        self.execute_capture(Self::shell(cmd), cmd)
    }

    fn capture_in_root(&self, root: &Path, cmd: &str) -> Result<String, ExecError> {
        let display = format!("({}) {cmd}", root.display());
        self.announce(">> ", &display);
        self.execute_capture(Self::chroot_shell(root, cmd), &display)
    }
}

/// Test runner: records the full command trace instead of executing, serves
/// canned capture output, and injects failures by substring or by position.
#[derive(Default)]
pub struct RecordingRunner {
    trace: Mutex<Vec<String>>,
    captures: Mutex<Vec<(String, String)>>,
    fail_on: Mutex<Option<String>>,
    fail_at: Mutex<Option<usize>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command seen so far, in execution order. In-root commands are
    /// prefixed with `(<root>) `.
    pub fn trace(&self) -> Vec<String> {
        self.trace.lock().expect("trace lock").clone()
    }

    /// Fail the first command whose text contains `needle`.
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().expect("fail_on lock") = Some(needle.to_owned());
    }

    /// Fail the `index`-th command (zero-based, counted across all variants).
    pub fn fail_at(&self, index: usize) {
        *self.fail_at.lock().expect("fail_at lock") = Some(index);
    }

    /// Serve `output` for any captured command containing `needle`.
    pub fn provide_capture(&self, needle: &str, output: &str) {
        self.captures
            .lock()
            .expect("captures lock")
            .push((needle.to_owned(), output.to_owned()));
    }

    fn record(&self, display: String) -> Result<(), ExecError> {
        let mut trace = self.trace.lock().expect("trace lock");
        let index = trace.len();
        trace.push(display.clone());
        drop(trace);

        if self.fail_at.lock().expect("fail_at lock").as_ref() == Some(&index) {
            return Err(ExecError::CommandFailed {
                cmd: display,
                code: Some(1),
                stderr: "injected failure".to_owned(),
            });
        }
        if let Some(needle) = self.fail_on.lock().expect("fail_on lock").as_deref() {
            if display.contains(needle) {
                return Err(ExecError::CommandFailed {
                    cmd: display,
                    code: Some(1),
                    stderr: "injected failure".to_owned(),
                });
            }
        }
        Ok(())
    }

    fn canned_output(&self, display: &str) -> String {
        self.captures
            .lock()
            .expect("captures lock")
            .iter()
            .find(|(needle, _)| display.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &str) -> Result<(), ExecError> {
        self.record(cmd.to_owned())
    }

    fn run_in_root(&self, root: &Path, cmd: &str) -> Result<(), ExecError> {
        self.record(format!("({}) {cmd}", root.display()))
    }

    fn capture(&self, cmd: &str) -> Result<String, ExecError> {
        self.record(cmd.to_owned())?;
        Ok(self.canned_output(cmd))
    }

    fn capture_in_root(&self, root: &Path, cmd: &str) -> Result<String, ExecError> {
        let display = format!("({}) {cmd}", root.display());
        self.record(display.clone())?;
        Ok(self.canned_output(&display))
    }
}
