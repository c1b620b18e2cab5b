//! systemd-boot loader entries for generations.
//!
//! Every generation gets `kodos-<id>.conf`; the default (current) entry is
//! named plain `kodos.conf` and `loader.conf` points at it. Entries reference
//! the generation's subvolume through `rootflags`, which is what makes each
//! generation independently bootable.

use crate::layout::GenerationLayout;
use crate::StateError;
use chrono::{DateTime, Local};
use kodos_exec::FileSink;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BootEntry {
    pub generation: u32,
    /// Concrete kernel version string, e.g. `6.12.1-kodos1`.
    pub kernel_version: String,
    /// Root device reference for the kernel command line, usually `UUID=...`.
    pub root_device: String,
    /// Extra kernel command-line options from the loader configuration.
    pub extra_options: Vec<String>,
    pub built_at: DateTime<Local>,
}

impl BootEntry {
    pub fn new(
        generation: u32,
        kernel_version: impl Into<String>,
        root_device: impl Into<String>,
        extra_options: Vec<String>,
    ) -> Self {
        Self {
            generation,
            kernel_version: kernel_version.into(),
            root_device: root_device.into(),
            extra_options,
            built_at: Local::now(),
        }
    }

    pub fn file_name(&self, is_default: bool) -> String {
        if is_default {
            "kodos.conf".to_owned()
        } else {
            format!("kodos-{}.conf", self.generation)
        }
    }

    pub fn render(&self) -> String {
        let kver = &self.kernel_version;
        let mut options = format!("root={} rw", self.root_device);
        for opt in &self.extra_options {
            options.push(' ');
            options.push_str(opt);
        }
        options.push_str(" rootflags=subvol=");
        options.push_str(&GenerationLayout::subvolume(self.generation));

        format!(
            "title KodOS\n\
             sort-key kodos\n\
             version Generation {gen} KodOS (build {ts} - {kver})\n\
             linux /vmlinuz-{kver}\n\
             initrd /initramfs-linux-{kver}.img\n\
             options {options}\n",
            gen = self.generation,
            ts = self.built_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

pub fn entries_dir(boot_root: &Path) -> PathBuf {
    boot_root.join("loader").join("entries")
}

pub fn loader_conf_path(boot_root: &Path) -> PathBuf {
    boot_root.join("loader").join("loader.conf")
}

/// Write the entry file for a generation under `<boot_root>/loader/entries/`.
pub fn write_entry(
    sink: &dyn FileSink,
    boot_root: &Path,
    entry: &BootEntry,
    is_default: bool,
) -> Result<PathBuf, StateError> {
    let path = entries_dir(boot_root).join(entry.file_name(is_default));
    sink.write(&path, &entry.render())?;
    Ok(path)
}

/// Point `loader.conf` at `default_entry`.
pub fn write_loader_conf(
    sink: &dyn FileSink,
    boot_root: &Path,
    default_entry: &str,
    timeout: u32,
) -> Result<(), StateError> {
    let contents = format!("default {default_entry}\ntimeout {timeout}\nconsole-mode keep\n");
    sink.write(&loader_conf_path(boot_root), &contents)?;
    Ok(())
}

/// Delete a generation's entry file if present. Used when a generation is
/// removed or rolled back; a missing file is not an error.
pub fn remove_entry(boot_root: &Path, generation: u32) -> io::Result<()> {
    let path = entries_dir(boot_root).join(format!("kodos-{generation}.conf"));
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kodos_exec::DirectSink;

    fn entry() -> BootEntry {
        BootEntry {
            generation: 4,
            kernel_version: "6.12.1-kodos1".to_owned(),
            root_device: "UUID=abcd-1234".to_owned(),
            extra_options: vec!["quiet".to_owned()],
            built_at: Local.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn renders_a_complete_loader_entry() {
        assert_eq!(
            entry().render(),
            "title KodOS\n\
             sort-key kodos\n\
             version Generation 4 KodOS (build 2026-08-25 12:00:00 - 6.12.1-kodos1)\n\
             linux /vmlinuz-6.12.1-kodos1\n\
             initrd /initramfs-linux-6.12.1-kodos1.img\n\
             options root=UUID=abcd-1234 rw quiet rootflags=subvol=generations/4/rootfs\n"
        );
    }

    #[test]
    fn default_entry_uses_the_bare_name() {
        let e = entry();
        assert_eq!(e.file_name(false), "kodos-4.conf");
        assert_eq!(e.file_name(true), "kodos.conf");
    }

    #[test]
    fn writes_entry_and_loader_conf() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_entry(&DirectSink, dir.path(), &entry(), false).unwrap();
        assert!(path.ends_with("loader/entries/kodos-4.conf"));
        assert!(path.is_file());

        write_loader_conf(&DirectSink, dir.path(), "kodos.conf", 10).unwrap();
        let conf = fs::read_to_string(loader_conf_path(dir.path())).unwrap();
        assert_eq!(conf, "default kodos.conf\ntimeout 10\nconsole-mode keep\n");
    }

    #[test]
    fn removing_a_missing_entry_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        remove_entry(dir.path(), 9).unwrap();
    }
}
