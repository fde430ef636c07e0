//! Stage 6: accounts, sudo and services.

use tracing::info;

use super::Context;
use crate::{
    config::Secret,
    error::{best_effort, InstallerError},
    registry::NetworkMode,
    ui,
};

const WHEEL_RULE: &str = "%wheel ALL=(ALL:ALL) ALL\n";
const SUDOERS_FILE: &str = "etc/sudoers.d/10-wheel";

/// Packages and units for the NetworkManager based modes.
pub fn network_plan(mode: NetworkMode) -> Option<(Vec<&'static str>, Vec<&'static str>)> {
    match mode {
        NetworkMode::NmDefault => Some((vec!["net-misc/networkmanager"], vec!["NetworkManager"])),
        NetworkMode::NmIwd => Some((
            vec!["net-misc/networkmanager", "net-wireless/iwd"],
            vec!["NetworkManager", "iwd"],
        )),
        NetworkMode::CopyIso | NetworkMode::Manual => None,
    }
}

pub fn run(ctx: &mut Context) -> Result<(), InstallerError> {
    let config = ctx.config;

    if let Some(password) = &config.root_password {
        best_effort("Setting the root password", set_password(ctx, "root", password));
    }

    if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
        info!("Creating user {username}");
        let created = best_effort(
            &format!("Creating user {username}"),
            ctx.chroot(&[
                "useradd",
                "-m",
                "-G",
                "wheel,audio,video",
                "-s",
                "/bin/bash",
                username,
            ]),
        );
        if let (Some(()), Some(password)) = (created, &config.user_password) {
            best_effort(
                &format!("Setting the password of {username}"),
                set_password(ctx, username, password),
            );
        }
    }

    if config.user_is_sudoer {
        best_effort("Granting sudo to the wheel group", enable_sudo(ctx));
    }

    best_effort("Setting up networking", enable_network(ctx));

    best_effort(
        "Enabling systemd-timesyncd",
        ctx.chroot(&["systemctl", "enable", "systemd-timesyncd"]),
    );

    if let Some(swap) = config.swap_partition.as_deref().filter(|s| !s.is_empty()) {
        info!("Swap partition {swap} is listed in fstab");
    }

    ui::print_success("Accounts and services configured.");
    Ok(())
}

/// Feeds `user:password` to `chpasswd` on stdin.
fn set_password(ctx: &mut Context, user: &str, password: &Secret) -> Result<(), InstallerError> {
    if password.is_empty() {
        return Ok(());
    }
    let root = ctx.root.clone();
    ctx.exec
        .run_in_chroot_with_secret(&root, &["chpasswd"], password, |pw| format!("{user}:{pw}\n"))
}

fn enable_sudo(ctx: &mut Context) -> Result<(), InstallerError> {
    ctx.chroot(&["emerge", "--noreplace", "app-admin/sudo"])?;
    let rule = ctx.target(SUDOERS_FILE);
    ctx.exec.write_file_mode(&rule, WHEEL_RULE, 0o440)
}

fn enable_network(ctx: &mut Context) -> Result<(), InstallerError> {
    let mode = ctx
        .config
        .network_mode
        .parse::<NetworkMode>()
        .map_err(|_| InstallerError::config(format!("unknown network mode '{}'", ctx.config.network_mode)))?;
    let Some((packages, units)) = network_plan(mode) else {
        info!("Network mode {mode}: no services installed");
        return Ok(());
    };

    let mut emerge = vec!["emerge", "--quiet-build=n"];
    emerge.extend(packages);
    ctx.chroot(&emerge)?;
    for unit in units {
        ctx.chroot(&["systemctl", "enable", unit])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_manager_modes_install_services() {
        assert!(network_plan(NetworkMode::CopyIso).is_none());
        assert!(network_plan(NetworkMode::Manual).is_none());

        let (packages, units) = network_plan(NetworkMode::NmIwd).unwrap();
        assert_eq!(packages, ["net-misc/networkmanager", "net-wireless/iwd"]);
        assert_eq!(units, ["NetworkManager", "iwd"]);

        let (packages, units) = network_plan(NetworkMode::NmDefault).unwrap();
        assert_eq!(packages, ["net-misc/networkmanager"]);
        assert_eq!(units, ["NetworkManager"]);
    }

    #[test]
    fn every_network_manager_mode_has_a_plan() {
        use strum::IntoEnumIterator;
        for mode in NetworkMode::iter() {
            assert_eq!(network_plan(mode).is_some(), mode.uses_network_manager());
        }
    }
}
