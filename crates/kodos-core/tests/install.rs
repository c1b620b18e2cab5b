//! First-install tests: command ordering and the artifacts of generation 0.

use kodos_config::manifest::parse_config_str;
use kodos_config::packages::RepoId;
use kodos_core::InstallOrchestrator;
use kodos_exec::{DirectSink, RecordingRunner};
use kodos_repo::{MockRepository, RepositoryBackend};
use kodos_state::{boot, GenerationLayout, StateStore};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

static SINK: DirectSink = DirectSink;

fn config_toml(mnt: &Path) -> String {
    format!(
        r#"
[system]
state_root = "/kod"
mount_point = "{mnt}"

[[repository]]
name = "main"
kind = "arch"
base = true

[packages]
main = ["git"]

[services]
enable = ["sshd"]

[locale]
default = "en_US.UTF-8 UTF-8"
keymap = "us"
timezone = "Europe/Rome"

[network]
hostname = "workstation"

[[user]]
name = "alice"
programs = ["htop"]

[[partition]]
source = "/dev/sda2"
mount = "/"
fstype = "btrfs"

[[partition]]
source = "UUID=BOOT-1"
mount = "/boot"
fstype = "vfat"
"#,
        mnt = mnt.display()
    )
}

fn mock_backends() -> BTreeMap<RepoId, Box<dyn RepositoryBackend>> {
    let mut backends: BTreeMap<RepoId, Box<dyn RepositoryBackend>> = BTreeMap::new();
    backends.insert(RepoId::new("main"), Box::new(MockRepository::base("main")));
    backends
}

fn runner() -> RecordingRunner {
    let runner = RecordingRunner::new();
    runner.provide_capture(
        "kernel-file",
        "linux /usr/lib/modules/6.12.1-kodos1/vmlinuz\n",
    );
    runner.provide_capture("list-installed", "git 2.46.0-1\n");
    runner.provide_capture("lsblk", "abcd-1234\n");
    runner
}

fn index_of(trace: &[String], needle: &str) -> usize {
    trace
        .iter()
        .position(|cmd| cmd.contains(needle))
        .unwrap_or_else(|| panic!("{needle:?} not found in trace: {trace:#?}"))
}

#[test]
fn install_bootstraps_and_commits_generation_zero() {
    let mnt_dir = tempfile::tempdir().unwrap();
    let mnt = mnt_dir.path();
    let config = parse_config_str(&config_toml(mnt)).expect("install config should parse");

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("kodos.toml");
    let mut file = fs::File::create(&source).unwrap();
    file.write_all(config_toml(mnt).as_bytes()).unwrap();

    let runner = runner();
    let id = InstallOrchestrator::new(&config, &runner, &SINK)
        .with_backends(mock_backends())
        .with_config_source(&source)
        .install()
        .expect("install should succeed");
    assert_eq!(id, 0);

    let trace = runner.trace();
    let subvolume = index_of(&trace, "btrfs subvolume create");
    let bootstrap = index_of(&trace, "mock-main bootstrap");
    let bootctl = index_of(&trace, "bootctl install");
    let kernel_copy = index_of(&trace, "cp /usr/lib/modules/6.12.1-kodos1/vmlinuz");
    let initramfs = index_of(&trace, "dracut --kver 6.12.1-kodos1");
    // User programs land in the base repository alongside declared packages.
    let install = index_of(&trace, "mock-main install git htop");
    let service = index_of(&trace, "systemctl enable sshd");
    let user = index_of(&trace, "useradd -m alice");
    assert!(subvolume < bootstrap);
    assert!(bootstrap < bootctl);
    assert!(bootctl < kernel_copy);
    assert!(kernel_copy < initramfs);
    assert!(initramfs < install);
    assert!(install < service);
    assert!(service < user);
    index_of(&trace, "locale-gen");
    index_of(&trace, "ln -sf /usr/share/zoneinfo/Europe/Rome /etc/localtime");
    // The bootstrap carries the essentials and the kernel metapackage.
    assert!(trace[bootstrap].contains("base-devel"));
    assert!(trace[bootstrap].contains("linux"));

    // Record, marker, and configuration copy live under the mounted store.
    let host_store = mnt.join("kod");
    let store = StateStore::new(GenerationLayout::new(&host_store));
    let record = store.load(0).expect("generation 0 record");
    assert_eq!(record.kernel_package, "linux 6.12.1-kodos1");
    assert_eq!(record.packages_by_repository["main"], vec!["git", "htop"]);
    assert_eq!(record.enabled_services, vec!["sshd"]);
    assert_eq!(StateStore::read_marker(mnt), Some(0));
    assert!(host_store.join("kodos.toml").is_file());

    // System files written through the sink.
    let fstab = fs::read_to_string(mnt.join("etc/fstab")).unwrap();
    assert!(fstab.contains("UUID=abcd-1234\t/\tbtrfs"));
    assert!(fstab.contains("UUID=BOOT-1\t/boot\tvfat"));
    assert!(fs::read_to_string(mnt.join("etc/os-release"))
        .unwrap()
        .contains("ID=kodos"));
    assert_eq!(
        fs::read_to_string(mnt.join("etc/locale.conf")).unwrap(),
        "LANG=en_US.UTF-8\n"
    );
    assert_eq!(
        fs::read_to_string(mnt.join("etc/vconsole.conf")).unwrap(),
        "KEYMAP=us\n"
    );
    assert_eq!(
        fs::read_to_string(mnt.join("etc/hostname")).unwrap(),
        "workstation\n"
    );
    assert_eq!(
        fs::read_to_string(mnt.join("etc/sudoers.d/kod")).unwrap(),
        "kod ALL=(ALL) NOPASSWD: ALL\n"
    );

    let boot_root = mnt.join("boot");
    assert!(boot::entries_dir(&boot_root).join("kodos-0.conf").is_file());
    assert!(boot::entries_dir(&boot_root).join("kodos.conf").is_file());
    let entry = fs::read_to_string(boot::entries_dir(&boot_root).join("kodos.conf")).unwrap();
    assert!(entry.contains("rootflags=subvol=generations/0/rootfs"));
}

#[test]
fn validation_failure_stops_before_bootstrap() {
    let mnt_dir = tempfile::tempdir().unwrap();
    let config = parse_config_str(&config_toml(mnt_dir.path())).unwrap();
    let runner = runner();
    runner.fail_on("mock-main validate git");

    InstallOrchestrator::new(&config, &runner, &SINK)
        .with_backends(mock_backends())
        .install()
        .unwrap_err();

    let trace = runner.trace();
    assert!(
        !trace.iter().any(|cmd| cmd.contains("bootstrap")),
        "bootstrap ran despite failed validation: {trace:#?}"
    );
    assert!(!trace.iter().any(|cmd| cmd.contains("useradd")));
}
