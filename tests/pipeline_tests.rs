//! End-to-end runs of the installation pipeline against a fake process
//! backend and a scratch root.

use std::{cell::RefCell, io, os::unix::fs::PermissionsExt, path::Path, rc::Rc};

use gentoo_installer::{
    cmd::{Backend, ExecMode, Executor, Finished},
    config::{DiskMode, Environment, InstallConfig, Secret},
    error::InstallerError,
    registry::Registry,
    steps::{self, disk, finalize, run_pipeline, Context},
    ui::Prompter,
};
use tempfile::TempDir;

// =============================================================================
// Fakes
// =============================================================================

type Spawned = Rc<RefCell<Vec<(Vec<String>, Option<String>)>>>;

/// Answers the read-only queries the pipeline makes and succeeds everything
/// else, except commands containing `fail_on`, which exit with status 1.
struct FakeHost {
    root: String,
    spawned: Spawned,
    fail_on: Option<&'static str>,
}

impl Backend for FakeHost {
    fn spawn(
        &mut self,
        argv: &[String],
        input: Option<&str>,
        _capture: bool,
    ) -> io::Result<Finished> {
        self.spawned
            .borrow_mut()
            .push((argv.to_vec(), input.map(str::to_string)));

        if self.fail_on.is_some_and(|needle| argv.join(" ").contains(needle)) {
            return Ok(Finished {
                code: Some(1),
                stdout: String::new(),
                stderr: "failed".to_string(),
            });
        }

        let stdout = match argv.first().map(String::as_str) {
            Some("findmnt") => format!(
                "SOURCE=\"/dev/sda2\" TARGET=\"{root}\" FSTYPE=\"ext4\" UUID=\"ROOT-UUID\"\n\
                 SOURCE=\"/dev/sda1\" TARGET=\"{root}/boot\" FSTYPE=\"vfat\" UUID=\"BOOT-UUID\"\n",
                root = self.root
            ),
            Some("blkid") => "SWAP-UUID\n".to_string(),
            Some("mirrorselect") => "GENTOO_MIRRORS=\"https://mirror.example/gentoo\"".to_string(),
            _ => String::new(),
        };
        Ok(Finished {
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

struct Answer(bool);

impl Prompter for Answer {
    fn confirm(&mut self, _question: &str) -> Result<bool, InstallerError> {
        Ok(self.0)
    }
}

const ROOT_PW: &str = "r00t-s3cret";
const USER_PW: &str = "us3r-s3cret";

fn complete_config() -> InstallConfig {
    InstallConfig {
        stage3_source: Some("https://distfiles.example/stage3-amd64-systemd.tar.xz".into()),
        target_disk: Some("/dev/sda".into()),
        swap_partition: Some("/dev/sda3".into()),
        use_uefi: Some(true),
        desktop_profile: Some("xfce".into()),
        hostname: Some("tux".into()),
        username: Some("larry".into()),
        root_password: Some(Secret::new(ROOT_PW)),
        user_password: Some(Secret::new(USER_PW)),
        network_mode: "nm_iwd".into(),
        ..Default::default()
    }
}

struct Scratch {
    dir: TempDir,
}

impl Scratch {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn root(&self) -> std::path::PathBuf {
        self.dir.path().join("gentoo")
    }

    fn env(&self) -> Environment {
        Environment {
            scratch_dir: self.dir.path().join("downloads"),
            cpu_count: 4,
            ..Default::default()
        }
    }
}

/// Runs the whole pipeline and returns the audit history plus every spawn.
fn run_once(
    scratch: &Scratch,
    config: &InstallConfig,
    mode: ExecMode,
    confirm: bool,
) -> (Result<(), InstallerError>, Vec<String>, Spawned) {
    run_failing(scratch, config, mode, confirm, None)
}

/// Like [`run_once`], with every command containing `fail_on` failing.
fn run_failing(
    scratch: &Scratch,
    config: &InstallConfig,
    mode: ExecMode,
    confirm: bool,
    fail_on: Option<&'static str>,
) -> (Result<(), InstallerError>, Vec<String>, Spawned) {
    let registry = Registry::builtin();
    let env = scratch.env();
    let spawned = Spawned::default();
    let backend = FakeHost {
        root: scratch.root().display().to_string(),
        spawned: spawned.clone(),
        fail_on,
    };
    let exec = Executor::with_backend(mode, Box::new(backend));
    let mut ctx = Context::new(config, &registry, &env, exec, Box::new(Answer(confirm)))
        .with_root(scratch.root());

    let result = run_pipeline(&mut ctx);
    let history = ctx.exec.history().to_vec();
    (result, history, spawned)
}

/// True when no history line mentions `needle` outside the scratch paths.
fn never_recorded(history: &[String], scratch: &Scratch, needle: &str) -> bool {
    let prefix = scratch.dir.path().display().to_string();
    history.iter().all(|line| !line.replace(&prefix, "").contains(needle))
}

fn position(history: &[String], needle: &str) -> usize {
    history
        .iter()
        .position(|line| line.contains(needle))
        .unwrap_or_else(|| panic!("no history line contains {needle:?}"))
}

// =============================================================================
// Dry-run
// =============================================================================

#[test]
fn dry_run_is_repeatable_and_touches_nothing() {
    let scratch = Scratch::new();
    let config = complete_config();

    let (first, history_a, _) = run_once(&scratch, &config, ExecMode::DryRun, true);
    let (second, history_b, spawned) = run_once(&scratch, &config, ExecMode::DryRun, true);

    first.unwrap();
    second.unwrap();
    assert_eq!(history_a, history_b);

    assert!(!scratch.root().exists());
    assert_eq!(std::fs::read_dir(scratch.dir.path()).unwrap().count(), 0);

    // Only read-only queries reach the process backend in a dry-run.
    for (argv, _) in spawned.borrow().iter() {
        assert!(
            ["findmnt", "blkid", "mirrorselect"].contains(&argv[0].as_str()),
            "unexpected spawn in dry-run: {argv:?}"
        );
    }
}

#[test]
fn dry_run_records_stages_in_order() {
    let scratch = Scratch::new();
    let root = scratch.root().display().to_string();
    let (result, history, _) = run_once(&scratch, &complete_config(), ExecMode::DryRun, true);
    result.unwrap();

    let order = [
        "parted /dev/sda --script mklabel gpt".to_string(),
        format!("mount /dev/sda2 {root}"),
        "wget -O".to_string(),
        format!("tar xpf {}", scratch.env().scratch_dir.join("stage3-amd64-systemd.tar.xz").display()),
        format!("write {root}/etc/fstab"),
        format!("mount --types proc /proc {root}/proc"),
        format!("write {root}/etc/hostname"),
        format!("chroot {root} locale-gen"),
        format!("append {root}/etc/portage/make.conf"),
        format!("chroot {root} emerge --sync"),
        format!("chroot {root} emerge --quiet-build=n sys-kernel/gentoo-kernel-bin"),
        format!("chroot {root} bootctl --path=/boot install"),
        format!("chroot {root} emerge --quiet-build=n xfce-base/xfce4-meta"),
        format!("chroot {root} systemctl enable lightdm"),
        format!("chroot {root} chpasswd (stdin redacted)"),
        format!("chroot {root} useradd -m -G wheel,audio,video -s /bin/bash larry"),
        format!("write {root}/etc/sudoers.d/10-wheel"),
        format!("chroot {root} systemctl enable iwd"),
        format!("chroot {root} systemctl enable systemd-timesyncd"),
    ];
    let positions: Vec<usize> = order.iter().map(|n| position(&history, n)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "stages out of order: {positions:?}"
    );
}

#[test]
fn passwords_never_appear_in_history() {
    let scratch = Scratch::new();
    let (result, history, _) = run_once(&scratch, &complete_config(), ExecMode::DryRun, true);
    result.unwrap();

    let redacted = history
        .iter()
        .filter(|l| l.ends_with("chpasswd (stdin redacted)"))
        .count();
    assert_eq!(redacted, 2);
    assert!(history.iter().all(|l| !l.contains(ROOT_PW) && !l.contains(USER_PW)));
}

// =============================================================================
// Confirmation gates and fatal stages
// =============================================================================

#[test]
fn declined_wipe_skips_disk_but_pipeline_continues() {
    let scratch = Scratch::new();
    let (result, history, _) = run_once(&scratch, &complete_config(), ExecMode::DryRun, false);
    result.unwrap();

    assert!(history.iter().all(|l| !l.starts_with("parted") && !l.starts_with("mkfs")));
    position(&history, "tar xpf");
    position(&history, "systemd-timesyncd");
}

#[test]
fn incomplete_config_never_starts() {
    let scratch = Scratch::new();
    let config = InstallConfig {
        hostname: None,
        ..complete_config()
    };
    let (result, history, _) = run_once(&scratch, &config, ExecMode::DryRun, true);

    match result {
        Err(InstallerError::Incomplete(missing)) => assert_eq!(missing, ["hostname"]),
        other => panic!("expected Incomplete, got {other:?}"),
    }
    assert!(history.is_empty());
}

#[test]
fn missing_local_tarball_aborts_before_chroot() {
    let scratch = Scratch::new();
    let config = InstallConfig {
        stage3_source: Some(scratch.dir.path().join("nope.tar.xz").display().to_string()),
        ..complete_config()
    };
    let (result, history, _) = run_once(&scratch, &config, ExecMode::DryRun, true);

    assert!(matches!(result, Err(InstallerError::MissingArchive(_))));
    assert!(history.iter().all(|l| !l.starts_with("chroot")));
}

#[test]
fn no_stage3_source_skips_extraction() {
    let scratch = Scratch::new();
    let config = InstallConfig {
        stage3_source: None,
        ..complete_config()
    };
    let (result, history, _) = run_once(&scratch, &config, ExecMode::DryRun, true);
    result.unwrap();

    assert!(history.iter().all(|l| !l.starts_with("tar ") && !l.starts_with("wget ")));
    position(&history, "bootctl");
}

fn disk_stage(config: &InstallConfig) -> Result<(), InstallerError> {
    let registry = Registry::builtin();
    let env = Environment::default();
    let exec = Executor::new(ExecMode::DryRun);
    let mut ctx = Context::new(config, &registry, &env, exec, Box::new(Answer(true)));
    disk::run(&mut ctx)
}

#[test]
fn disk_stage_needs_its_device() {
    let auto = InstallConfig {
        target_disk: None,
        ..complete_config()
    };
    assert!(matches!(disk_stage(&auto), Err(InstallerError::Config(_))));

    let manual = InstallConfig {
        disk_mode: DiskMode::Manual,
        root_partition: None,
        ..complete_config()
    };
    assert!(matches!(disk_stage(&manual), Err(InstallerError::Config(_))));
}

#[test]
fn manual_mode_formats_marked_partitions_only() {
    let scratch = Scratch::new();
    let root = scratch.root().display().to_string();
    let mut config = InstallConfig {
        disk_mode: DiskMode::Manual,
        target_disk: None,
        root_partition: Some("/dev/sda2".into()),
        boot_partition: Some("/dev/sda1".into()),
        ..complete_config()
    };
    config.format_partitions.insert("/dev/sda2".into(), "ext4".into());
    config.format_partitions.insert("/dev/sda4".into(), "btrfs".into());

    let (result, history, _) = run_once(&scratch, &config, ExecMode::DryRun, true);
    result.unwrap();

    let mkfs: Vec<&String> = history.iter().filter(|l| l.starts_with("mkfs")).collect();
    assert_eq!(mkfs, ["mkfs.ext4 /dev/sda2"]);
    assert!(history.iter().all(|l| !l.starts_with("parted")));
    position(&history, &format!("mount /dev/sda1 {root}/boot"));
}

// =============================================================================
// Unknown and empty choices
// =============================================================================

#[test]
fn none_profile_installs_no_desktop() {
    let scratch = Scratch::new();
    let config = InstallConfig {
        desktop_profile: Some("none".into()),
        ..complete_config()
    };
    let (result, history, _) = run_once(&scratch, &config, ExecMode::DryRun, true);
    result.unwrap();

    for desktop in ["xfce", "gnome", "plasma", "lightdm", "gdm", "sddm"] {
        assert!(never_recorded(&history, &scratch, desktop), "{desktop} recorded");
    }
    position(&history, "systemd-timesyncd");
}

#[test]
fn unknown_choices_are_skipped_and_the_run_completes() {
    let scratch = Scratch::new();
    let config = InstallConfig {
        desktop_profile: Some("kde".into()),
        bootloader: "lilo".into(),
        kernel: "weird".into(),
        ..complete_config()
    };
    let (result, history, _) = run_once(&scratch, &config, ExecMode::DryRun, true);
    result.unwrap();

    for skipped in ["bootctl", "grub", "sys-kernel/", "systemctl enable lightdm", "kde"] {
        assert!(never_recorded(&history, &scratch, skipped), "{skipped} recorded");
    }
    let order = [
        position(&history, "emerge --sync"),
        position(&history, "chpasswd"),
        position(&history, "systemd-timesyncd"),
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]));
}

// =============================================================================
// Live mode against the scratch root
// =============================================================================

#[test]
fn live_finalize_feeds_passwords_on_stdin() {
    let scratch = Scratch::new();
    let root = scratch.root();
    let config = complete_config();
    let registry = Registry::builtin();
    let env = scratch.env();
    let spawned = Spawned::default();
    let backend = FakeHost {
        root: root.display().to_string(),
        spawned: spawned.clone(),
        fail_on: None,
    };
    let exec = Executor::with_backend(ExecMode::Live, Box::new(backend));
    let mut ctx = Context::new(&config, &registry, &env, exec, Box::new(Answer(true)))
        .with_root(&root);

    finalize::run(&mut ctx).unwrap();

    let spawned = spawned.borrow();
    let chpasswd: Vec<_> = spawned
        .iter()
        .filter(|(argv, _)| argv.last().map(String::as_str) == Some("chpasswd"))
        .collect();
    assert_eq!(chpasswd.len(), 2);
    assert_eq!(chpasswd[0].1.as_deref(), Some(format!("root:{ROOT_PW}\n").as_str()));
    assert_eq!(chpasswd[1].1.as_deref(), Some(format!("larry:{USER_PW}\n").as_str()));
    for (argv, _) in spawned.iter() {
        assert!(argv.iter().all(|a| !a.contains(ROOT_PW) && !a.contains(USER_PW)));
    }
    assert!(ctx
        .exec
        .history()
        .iter()
        .all(|l| !l.contains(ROOT_PW) && !l.contains(USER_PW)));

    let rule = root.join("etc/sudoers.d/10-wheel");
    assert_eq!(std::fs::read_to_string(&rule).unwrap(), "%wheel ALL=(ALL:ALL) ALL\n");
    let mode = std::fs::metadata(&rule).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o440);
}

#[test]
fn live_base_stage_writes_system_files() {
    let scratch = Scratch::new();
    let root = scratch.root();
    std::fs::create_dir_all(&root).unwrap();
    let config = InstallConfig {
        language: "pl_PL".into(),
        makeopts_jobs: Some(6),
        ..complete_config()
    };
    let registry = Registry::builtin();
    let env = scratch.env();
    let backend = FakeHost {
        root: root.display().to_string(),
        spawned: Spawned::default(),
        fail_on: None,
    };
    let exec = Executor::with_backend(ExecMode::Live, Box::new(backend));
    let mut ctx = Context::new(&config, &registry, &env, exec, Box::new(Answer(true)))
        .with_root(&root);

    steps::base::run(&mut ctx).unwrap();

    let read = |rel: &str| std::fs::read_to_string(root.join(rel)).unwrap();
    assert_eq!(read("etc/hostname"), "tux\n");
    assert!(read("etc/hosts").contains("127.0.1.1\ttux\n"));
    assert_eq!(read("etc/locale.gen"), "pl_PL.UTF-8 UTF-8\n");
    assert_eq!(read("etc/locale.conf"), "LANG=pl_PL.UTF-8\n");
    assert_eq!(read("etc/timezone"), "UTC\n");

    let make_conf = read("etc/portage/make.conf");
    assert!(make_conf.starts_with("MAKEOPTS=\"-j6\"\n"));
    assert!(make_conf.contains("EMERGE_DEFAULT_OPTS=\"--jobs=6 --load-average=6\"\n"));
    assert!(make_conf.contains("GENTOO_MIRRORS=\"https://mirror.example/gentoo\"\n"));
    assert!(!make_conf.contains("\\n"));

    let mtab = root.join("etc/mtab");
    assert_eq!(std::fs::read_link(&mtab).unwrap(), Path::new("/proc/self/mounts"));
}

// =============================================================================
// Live failures: fatal and recoverable stages
// =============================================================================

fn live_config() -> InstallConfig {
    InstallConfig {
        stage3_source: None,
        ..complete_config()
    }
}

#[test]
fn failing_partitioner_aborts_the_run() {
    let scratch = Scratch::new();
    let (result, history, spawned) =
        run_failing(&scratch, &live_config(), ExecMode::Live, true, Some("parted"));

    match result {
        Err(InstallerError::CommandFailed { program, code, .. }) => {
            assert_eq!(program, "parted");
            assert_eq!(code, 1);
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
    assert_eq!(history, ["parted /dev/sda --script mklabel gpt"]);
    assert_eq!(spawned.borrow().len(), 1);
}

#[test]
fn failing_sync_is_reported_and_the_run_continues() {
    let scratch = Scratch::new();
    let root = scratch.root().display().to_string();
    let (result, history, _) =
        run_failing(&scratch, &live_config(), ExecMode::Live, true, Some("emerge --sync"));
    result.unwrap();

    let sync = position(&history, &format!("chroot {root} emerge --sync"));
    assert!(sync < position(&history, "sys-kernel/gentoo-kernel-bin"));
    assert!(sync < position(&history, "bootctl"));
    position(&history, &format!("chroot {root} systemctl enable systemd-timesyncd"));
}

#[test]
fn failing_chroot_setup_skips_base_but_later_stages_run() {
    let scratch = Scratch::new();
    let (result, history, _) =
        run_failing(&scratch, &live_config(), ExecMode::Live, true, Some("mount --types proc"));
    result.unwrap();

    position(&history, "mount --types proc");
    assert!(never_recorded(&history, &scratch, "locale-gen"));
    assert!(never_recorded(&history, &scratch, "emerge --sync"));
    position(&history, "useradd");
    position(&history, "systemd-timesyncd");
}
