//! Kernel resolution and staging inside a mounted root.
//!
//! The package manager tells us which image file the kernel package owns;
//! the version is the path component before the image name. Staging copies
//! the image to `/boot` and regenerates the initramfs, in that order, since
//! the initramfs references the image by version.

use crate::CoreError;
use kodos_exec::{CommandRunner, ExecError};
use kodos_repo::RepositoryBackend;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKernel {
    /// Path of the kernel image inside the root, e.g.
    /// `/usr/lib/modules/6.12.1-kodos1/vmlinuz`.
    pub image: String,
    /// Version string, e.g. `6.12.1-kodos1`.
    pub version: String,
}

impl ResolvedKernel {
    /// The `<metapackage> <version>` string recorded in generation state.
    pub fn record_string(&self, package: &str) -> String {
        format!("{package} {}", self.version)
    }
}

/// Ask the base backend which kernel image `package` owns in `root`.
pub fn resolve(
    runner: &dyn CommandRunner,
    root: &Path,
    backend: &dyn RepositoryBackend,
    package: &str,
) -> Result<ResolvedKernel, CoreError> {
    let Some(cmd) = backend.kernel_file_command(package) else {
        return Err(CoreError::Exec(ExecError::CommandFailed {
            cmd: format!("kernel lookup for {package}"),
            code: None,
            stderr: format!("backend {} cannot locate kernel images", backend.name()),
        }));
    };
    let output = runner.capture_in_root(root, &cmd)?;
    parse_kernel_query(&output).ok_or_else(|| {
        CoreError::Exec(ExecError::CommandFailed {
            cmd,
            code: None,
            stderr: format!("no kernel image found in output: {output:?}"),
        })
    })
}

/// Copy the kernel image to `/boot` and regenerate the initramfs. Extra
/// `modules` from the boot section are forced into the image.
pub fn stage(
    runner: &dyn CommandRunner,
    root: &Path,
    kernel: &ResolvedKernel,
    modules: &[String],
) -> Result<(), CoreError> {
    runner.run_in_root(
        root,
        &format!("cp {} /boot/vmlinuz-{}", kernel.image, kernel.version),
    )?;
    let drivers = if modules.is_empty() {
        String::new()
    } else {
        format!(" --add-drivers \"{}\"", modules.join(" "))
    };
    runner.run_in_root(
        root,
        &format!(
            "dracut --kver {v} --hostonly{drivers} /boot/initramfs-linux-{v}.img",
            v = kernel.version
        ),
    )?;
    Ok(())
}

// Query output is "<package> <path>" (pacman) or a bare path (dpkg-query);
// the last whitespace-separated token is the image path either way. The
// version is the `vmlinuz-<version>` suffix when present (Debian layout),
// otherwise the parent directory name (Arch modules layout).
fn parse_kernel_query(output: &str) -> Option<ResolvedKernel> {
    let image = output.split_whitespace().last()?.to_owned();
    let mut components = image.rsplit('/');
    let file_name = components.next()?;
    let version = match file_name.strip_prefix("vmlinuz-") {
        Some(suffix) if !suffix.is_empty() => suffix.to_owned(),
        _ => components.next()?.to_owned(),
    };
    if version.is_empty() {
        return None;
    }
    Some(ResolvedKernel { image, version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodos_exec::RecordingRunner;
    use kodos_repo::MockRepository;
    use std::path::PathBuf;

    #[test]
    fn parses_pacman_style_output() {
        let kernel =
            parse_kernel_query("linux /usr/lib/modules/6.12.1-kodos1/vmlinuz\n").unwrap();
        assert_eq!(kernel.image, "/usr/lib/modules/6.12.1-kodos1/vmlinuz");
        assert_eq!(kernel.version, "6.12.1-kodos1");
    }

    #[test]
    fn parses_dpkg_style_output() {
        let kernel = parse_kernel_query("/boot/vmlinuz-6.1.0-18-amd64\n").unwrap();
        assert_eq!(kernel.image, "/boot/vmlinuz-6.1.0-18-amd64");
        assert_eq!(kernel.version, "6.1.0-18-amd64");
    }

    #[test]
    fn empty_query_output_is_rejected() {
        assert!(parse_kernel_query("\n").is_none());
    }

    #[test]
    fn staging_copies_before_initramfs() {
        let runner = RecordingRunner::new();
        let kernel = ResolvedKernel {
            image: "/usr/lib/modules/6.12.1/vmlinuz".to_owned(),
            version: "6.12.1".to_owned(),
        };
        stage(&runner, &PathBuf::from("/mnt"), &kernel, &[]).unwrap();
        let trace = runner.trace();
        assert_eq!(
            trace,
            vec![
                "(/mnt) cp /usr/lib/modules/6.12.1/vmlinuz /boot/vmlinuz-6.12.1",
                "(/mnt) dracut --kver 6.12.1 --hostonly /boot/initramfs-linux-6.12.1.img",
            ]
        );
    }

    #[test]
    fn staging_forces_extra_modules_into_the_initramfs() {
        let runner = RecordingRunner::new();
        let kernel = ResolvedKernel {
            image: "/usr/lib/modules/6.12.1/vmlinuz".to_owned(),
            version: "6.12.1".to_owned(),
        };
        let modules = vec!["vfio-pci".to_owned(), "i915".to_owned()];
        stage(&runner, &PathBuf::from("/mnt"), &kernel, &modules).unwrap();
        assert_eq!(
            runner.trace()[1],
            "(/mnt) dracut --kver 6.12.1 --hostonly --add-drivers \"vfio-pci i915\" \
             /boot/initramfs-linux-6.12.1.img"
        );
    }

    #[test]
    fn resolve_uses_the_backend_query() {
        let runner = RecordingRunner::new();
        runner.provide_capture(
            "kernel-file",
            "linux /usr/lib/modules/6.12.1-kodos1/vmlinuz\n",
        );
        let backend = MockRepository::base("main");
        let kernel = resolve(&runner, &PathBuf::from("/mnt"), &backend, "linux").unwrap();
        assert_eq!(kernel.version, "6.12.1-kodos1");
        assert_eq!(kernel.record_string("linux"), "linux 6.12.1-kodos1");
    }

    #[test]
    fn non_base_backend_cannot_resolve() {
        let runner = RecordingRunner::new();
        let backend = MockRepository::new("aux");
        assert!(resolve(&runner, &PathBuf::from("/mnt"), &backend, "linux").is_err());
    }
}
