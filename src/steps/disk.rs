//! Partitioning, formatting and mounting of the target.

use std::{collections::BTreeMap, path::Path};

use console::style;
use tracing::{info, warn};

use super::Context;
use crate::{config::DiskMode, error::InstallerError, ui};

/// End of the EFI system partition in auto UEFI layouts.
pub const ESP_END: &str = "513MiB";

pub type Argv = Vec<String>;

fn argv(parts: &[&str]) -> Argv {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Full device path of partition `number` on `disk`.
///
/// NVMe and MMC devices put a `p` between disk name and number.
pub fn part_name(disk: &str, number: u32) -> String {
    if disk.starts_with("/dev/nvme") || disk.starts_with("/dev/mmcblk") {
        format!("{disk}p{number}")
    } else {
        format!("{disk}{number}")
    }
}

// ── Plans ─────────────────────────────────────────────────────────────────────

/// Wipes `disk` and lays out a fresh system mounted at `root`.
///
/// UEFI: GPT, FAT32 ESP (1MiB..513MiB) + ext4 root on the rest.
/// BIOS: MBR, a single ext4 root spanning the disk.
pub fn auto_plan(disk: &str, uefi: bool, root: &Path) -> Vec<Argv> {
    let root_dir = root.display().to_string();
    let boot_dir = root.join("boot").display().to_string();

    if uefi {
        let boot_part = part_name(disk, 1);
        let root_part = part_name(disk, 2);
        vec![
            argv(&["parted", disk, "--script", "mklabel", "gpt"]),
            argv(&["parted", disk, "--script", "mkpart", "ESP", "fat32", "1MiB", ESP_END]),
            argv(&["parted", disk, "--script", "set", "1", "boot", "on"]),
            argv(&["parted", disk, "--script", "mkpart", "primary", "ext4", ESP_END, "100%"]),
            argv(&["mkfs.vfat", "-F32", &boot_part]),
            argv(&["mkfs.ext4", &root_part]),
            argv(&["mkdir", "-p", &root_dir]),
            argv(&["mount", &root_part, &root_dir]),
            argv(&["mkdir", "-p", &boot_dir]),
            argv(&["mount", &boot_part, &boot_dir]),
        ]
    } else {
        let root_part = part_name(disk, 1);
        vec![
            argv(&["parted", disk, "--script", "mklabel", "msdos"]),
            argv(&["parted", disk, "--script", "mkpart", "primary", "ext4", "1MiB", "100%"]),
            argv(&["mkfs.ext4", &root_part]),
            argv(&["mkdir", "-p", &root_dir]),
            argv(&["mount", &root_part, &root_dir]),
        ]
    }
}

/// `mkfs` invocation for one partition marked in manual mode.
/// `None` for filesystems the installer cannot create.
pub fn format_command(partition: &str, fs: &str) -> Option<Argv> {
    match fs {
        "ext4" => Some(argv(&["mkfs.ext4", partition])),
        "vfat" | "fat32" => Some(argv(&["mkfs.vfat", "-F32", partition])),
        _ => None,
    }
}

/// Mounts existing partitions; the partition table is never touched.
pub fn mount_plan(root_part: &str, boot_part: Option<&str>, root: &Path) -> Vec<Argv> {
    let root_dir = root.display().to_string();
    let mut plan = vec![
        argv(&["mkdir", "-p", &root_dir]),
        argv(&["mount", root_part, &root_dir]),
    ];
    if let Some(boot_part) = boot_part {
        let boot_dir = root.join("boot").display().to_string();
        plan.push(argv(&["mkdir", "-p", &boot_dir]));
        plan.push(argv(&["mount", boot_part, &boot_dir]));
    }
    plan
}

fn execute(ctx: &mut Context, plan: &[Argv]) -> Result<(), InstallerError> {
    for command in plan {
        let spin = format!("{}…", command.join(" "));
        ctx.exec.run_quiet(command, &spin)?;
    }
    Ok(())
}

// ── Stage ─────────────────────────────────────────────────────────────────────

/// Stage 1: prepares and mounts the target at the install root.
pub fn run(ctx: &mut Context) -> Result<(), InstallerError> {
    match ctx.config.disk_mode {
        DiskMode::Auto => prepare_auto(ctx),
        DiskMode::Manual => prepare_manual(ctx),
    }
}

fn prepare_auto(ctx: &mut Context) -> Result<(), InstallerError> {
    let disk = ctx
        .config
        .target_disk
        .clone()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| InstallerError::config("no target disk selected"))?;

    println!();
    println!(
        "  {}",
        style(format!("⚠  THIS WILL PERMANENTLY ERASE ALL DATA ON {disk}."))
            .red()
            .bold()
    );
    if !ctx
        .prompter
        .confirm(&format!("Erase {disk} and create a new partition layout?"))?
    {
        warn!("Disk preparation declined; {disk} left untouched");
        ui::print_warning("Skipping disk preparation.");
        return Ok(());
    }

    if ctx.config.root_fs != "ext4" {
        warn!(
            "Root filesystem '{}' is not implemented, using ext4",
            ctx.config.root_fs
        );
    }

    let uefi = ctx.config.use_uefi.unwrap_or(false);
    info!(
        "Planning {} layout on {disk}",
        if uefi { "GPT + EFI system partition + ext4 root" } else { "MBR + single ext4 root" }
    );

    let plan = auto_plan(&disk, uefi, &ctx.root);
    execute(ctx, &plan)?;
    ui::print_success(&format!("{disk} partitioned and mounted at {}.", ctx.root_str()));
    Ok(())
}

fn prepare_manual(ctx: &mut Context) -> Result<(), InstallerError> {
    let root_part = ctx
        .config
        .root_partition
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            InstallerError::config("manual disk mode selected but no root partition set")
        })?;

    let config = ctx.config;
    format_marked(ctx, &config.format_partitions)?;

    info!("Using existing partitions; the partition table will not be modified");
    let boot_part = config.boot_partition.clone().filter(|p| !p.is_empty());
    let plan = mount_plan(&root_part, boot_part.as_deref(), &ctx.root);
    execute(ctx, &plan)?;
    ui::print_success(&format!("{root_part} mounted at {}.", ctx.root_str()));
    Ok(())
}

/// Formats the partitions marked in manual mode after a separate confirmation.
/// Declining keeps the existing filesystems.
fn format_marked(
    ctx: &mut Context,
    marked: &BTreeMap<String, String>,
) -> Result<(), InstallerError> {
    if marked.is_empty() {
        return Ok(());
    }

    ui::print_kv_box(
        "Partitions to format",
        &marked
            .iter()
            .map(|(path, fs)| (path.as_str(), fs.clone()))
            .collect::<Vec<_>>(),
    );
    if !ctx
        .prompter
        .confirm("Format the partitions above? THIS WILL DESTROY THEIR DATA.")?
    {
        warn!("Formatting declined; mounting existing filesystems as they are");
        return Ok(());
    }

    for (partition, fs) in marked {
        match format_command(partition, fs) {
            Some(command) => {
                ctx.exec
                    .run_quiet(&command, &format!("Formatting {partition} as {fs}…"))?
            }
            None => warn!("Cannot create filesystem '{fs}' on {partition}; skipping"),
        }
    }
    Ok(())
}
