use tracing::{info, warn};

use super::Context;
use crate::{error::InstallerError, registry::Bootloader, ui};

/// Chrooted commands installing `bootloader`.
///
/// `None` when this combination cannot be installed: systemd-boot without
/// UEFI, GRUB for BIOS without a target disk, or a bootloader the installer
/// does not set up yet.
pub fn plan(bootloader: Bootloader, uefi: bool, disk: Option<&str>) -> Option<Vec<Vec<String>>> {
    let argv = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();

    match bootloader {
        Bootloader::SystemdBoot if uefi => Some(vec![argv(&["bootctl", "--path=/boot", "install"])]),
        Bootloader::Grub => {
            let install = if uefi {
                argv(&[
                    "grub-install",
                    "--target=x86_64-efi",
                    "--efi-directory=/boot",
                    "--bootloader-id=Gentoo",
                ])
            } else {
                argv(&["grub-install", disk.filter(|d| !d.is_empty())?])
            };
            Some(vec![
                argv(&["emerge", "sys-boot/grub"]),
                install,
                argv(&["grub-mkconfig", "-o", "/boot/grub/grub.cfg"]),
            ])
        }
        _ => None,
    }
}

/// Stage 4.
pub fn run(ctx: &mut Context) -> Result<(), InstallerError> {
    let name = ctx.config.bootloader.as_str();
    let Ok(bootloader) = name.parse::<Bootloader>() else {
        warn!("Unknown bootloader '{name}'; skipping");
        ui::print_warning(&format!("Unknown bootloader '{name}', nothing installed."));
        return Ok(());
    };

    let uefi = ctx.config.use_uefi.unwrap_or(false);
    let Some(commands) = plan(bootloader, uefi, ctx.config.target_disk.as_deref()) else {
        let reason = match bootloader {
            Bootloader::SystemdBoot => "it needs UEFI".to_string(),
            Bootloader::Grub => "BIOS install needs a target disk".to_string(),
            other => format!("{other} is not supported yet"),
        };
        warn!("Skipping bootloader {bootloader}: {reason}");
        ui::print_warning(&format!("Bootloader not installed: {reason}."));
        return Ok(());
    };

    info!("Installing bootloader {bootloader} ({})", if uefi { "UEFI" } else { "BIOS" });
    for command in &commands {
        ctx.chroot(command)?;
    }

    if bootloader == Bootloader::SystemdBoot {
        ui::print_info("Make sure kernel entries exist under /boot/loader/entries.");
    }
    ui::print_success(&format!("{bootloader} installed."));
    Ok(())
}
