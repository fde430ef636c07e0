use std::path::{Path, PathBuf};

use tracing::info;

use crate::{cmd::Executor, error::InstallerError};

const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Host pseudo filesystems bind-mounted into the target, in mount order.
const BIND_MOUNTS: [&str; 3] = ["sys", "dev", "run"];

/// Commands that make `root` usable as a chroot.
///
/// `/proc` is a fresh mount; `/sys`, `/dev` and `/run` are recursive binds of
/// the host, each marked as a slave so host mount changes do not propagate.
pub fn mount_plan(root: &Path) -> Vec<Vec<String>> {
    let at = |dir: &str| root.join(dir).display().to_string();

    let mut plan = vec![vec![
        "mount".to_string(),
        "--types".to_string(),
        "proc".to_string(),
        "/proc".to_string(),
        at("proc"),
    ]];
    for dir in BIND_MOUNTS {
        plan.push(vec![
            "mount".to_string(),
            "--rbind".to_string(),
            format!("/{dir}"),
            at(dir),
        ]);
        plan.push(vec!["mount".to_string(), "--make-rslave".to_string(), at(dir)]);
    }
    plan
}

/// Mounts the pseudo filesystems. Running it again only remounts; nothing is
/// torn down afterwards.
pub fn establish(exec: &mut Executor, root: &Path) -> Result<(), InstallerError> {
    info!("Setting up chroot environment in {}", root.display());
    for command in mount_plan(root) {
        exec.run(&command)?;
    }
    Ok(())
}

/// Copies the host resolver configuration so chrooted downloads work.
pub fn copy_resolver(exec: &mut Executor, root: &Path) -> Result<(), InstallerError> {
    copy_resolver_from(exec, Path::new(HOST_RESOLV_CONF), root)
}

fn copy_resolver_from(
    exec: &mut Executor,
    host: &Path,
    root: &Path,
) -> Result<(), InstallerError> {
    if !host.exists() {
        info!("{} not present on the host; not copied", host.display());
        return Ok(());
    }
    let target: PathBuf = root.join("etc/resolv.conf");
    exec.copy_file(host, &target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::ExecMode;

    #[test]
    fn proc_first_then_bind_and_slave_pairs() {
        let plan: Vec<String> = mount_plan(Path::new("/mnt/gentoo"))
            .iter()
            .map(|c| c.join(" "))
            .collect();

        assert_eq!(
            plan,
            [
                "mount --types proc /proc /mnt/gentoo/proc",
                "mount --rbind /sys /mnt/gentoo/sys",
                "mount --make-rslave /mnt/gentoo/sys",
                "mount --rbind /dev /mnt/gentoo/dev",
                "mount --make-rslave /mnt/gentoo/dev",
                "mount --rbind /run /mnt/gentoo/run",
                "mount --make-rslave /mnt/gentoo/run",
            ]
        );
    }

    #[test]
    fn establishing_twice_repeats_the_same_mounts() {
        let mut exec = Executor::new(ExecMode::DryRun);
        let root = Path::new("/mnt/gentoo");
        establish(&mut exec, root).unwrap();
        establish(&mut exec, root).unwrap();

        let (first, second) = exec.history().split_at(7);
        assert_eq!(first, second);
    }

    #[test]
    fn resolver_copied_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let host = dir.path().join("resolv.conf");
        let root = dir.path().join("root");
        let mut exec = Executor::new(ExecMode::Live);

        copy_resolver_from(&mut exec, &host, &root).unwrap();
        assert!(exec.history().is_empty());

        std::fs::write(&host, "nameserver 9.9.9.9\n").unwrap();
        copy_resolver_from(&mut exec, &host, &root).unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("etc/resolv.conf")).unwrap(),
            "nameserver 9.9.9.9\n"
        );
    }
}
