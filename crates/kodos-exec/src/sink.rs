use crate::{fsync_dir, ExecError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Destination for persisted writes. The engine never special-cases dry-run
/// for file output; it always writes through a sink, and the caller decides
/// whether that sink hits the real filesystem or a staging area.
pub trait FileSink {
    fn write(&self, path: &Path, contents: &str) -> Result<(), ExecError>;

    fn create_dir_all(&self, path: &Path) -> Result<(), ExecError>;
}

/// Writes to the real filesystem, atomically: tempfile in the destination
/// directory, fsync, rename, fsync the directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSink;

impl DirectSink {
    pub fn new() -> Self {
        Self
    }
}

impl FileSink for DirectSink {
    fn write(&self, path: &Path, contents: &str) -> Result<(), ExecError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ExecError::Io(e.error))?;
        fsync_dir(dir)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), ExecError> {
        fs::create_dir_all(path)?;
        Ok(())
    }
}

/// Redirects every write under a staging root, for dry runs. The path
/// structure is preserved so a staged tree can be inspected afterwards.
#[derive(Debug, Clone)]
pub struct StagingSink {
    staging_root: PathBuf,
}

impl StagingSink {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }

    fn staged(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.staging_root.join(relative)
    }
}

impl FileSink for StagingSink {
    fn write(&self, path: &Path, contents: &str) -> Result<(), ExecError> {
        let staged = self.staged(path);
        info!("[dry-run] write {} ({} bytes)", path.display(), contents.len());
        DirectSink.write(&staged, contents)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), ExecError> {
        fs::create_dir_all(self.staged(path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_sink_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.txt");
        DirectSink.write(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn direct_sink_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        DirectSink.write(&path, "one").unwrap();
        DirectSink.write(&path, "two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn staging_sink_redirects_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = StagingSink::new(dir.path());
        sink.write(Path::new("/etc/fstab"), "contents").unwrap();
        let staged = dir.path().join("etc/fstab");
        assert_eq!(fs::read_to_string(staged).unwrap(), "contents");
    }
}
