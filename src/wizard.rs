//! Interactive collection of the install settings.
//!
//! A main menu lists every section with its current value; each entry edits
//! one part of the [`InstallConfig`] in place. The run only starts from
//! "Install" once the configuration is complete.

use std::path::PathBuf;

use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::info;

use crate::{
    cmd::Executor,
    config::{DiskMode, Environment, InstallConfig, Secret},
    error::InstallerError,
    lsblk::{self, DiskDescriptor},
    registry::Registry,
    steps::uefi,
    ui,
};

const DEFAULT_SAVE_PATH: &str = "/root/gentoo_install_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Section {
    Language,
    #[strum(serialize = "Stage3 source")]
    Stage3,
    #[strum(serialize = "Build options")]
    BuildOptions,
    #[strum(serialize = "Disk configuration")]
    Disk,
    Swap,
    Hostname,
    User,
    Authentication,
    #[strum(serialize = "Desktop profile")]
    Desktop,
    Bootloader,
    Kernel,
    Network,
    #[strum(serialize = "Save config")]
    Save,
    Install,
    Abort,
}

fn shown(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or("not set")
        .to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Current value of `section`, shown next to its name in the main menu.
pub fn summary(section: Section, config: &InstallConfig) -> String {
    match section {
        Section::Language => config.language.clone(),
        Section::Stage3 => shown(&config.stage3_source),
        Section::BuildOptions => format!(
            "-j{}  parallel-fetch: {}  keep-going: {}",
            config
                .makeopts_jobs
                .map_or_else(|| "auto".to_string(), |j| j.to_string()),
            yes_no(config.features_parallel_fetch),
            yes_no(config.emerge_keep_going)
        ),
        Section::Disk => {
            let uefi = match config.use_uefi {
                Some(true) => "UEFI",
                Some(false) => "BIOS",
                None => "firmware not set",
            };
            match config.disk_mode {
                DiskMode::Auto => format!("auto, wipe {} ({uefi})", shown(&config.target_disk)),
                DiskMode::Manual => format!(
                    "manual, root {} boot {} ({uefi})",
                    shown(&config.root_partition),
                    shown(&config.boot_partition)
                ),
            }
        }
        Section::Swap => shown(&config.swap_partition),
        Section::Hostname => shown(&config.hostname),
        Section::User => shown(&config.username),
        Section::Authentication => format!(
            "root pw: {}  user pw: {}  sudo: {}",
            yes_no(config.root_password.is_some()),
            yes_no(config.user_password.is_some()),
            yes_no(config.user_is_sudoer)
        ),
        Section::Desktop => shown(&config.desktop_profile),
        Section::Bootloader => config.bootloader.clone(),
        Section::Kernel => config.kernel.clone(),
        Section::Network => config.network_mode.clone(),
        Section::Install => {
            let missing = config.missing_fields();
            if missing.is_empty() {
                "ready".to_string()
            } else {
                format!("missing: {}", missing.join(", "))
            }
        }
        Section::Save | Section::Abort => String::new(),
    }
}

/// Accepts a positive job count; blank means "use the CPU count".
pub fn parse_jobs(input: &str) -> Result<Option<u32>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    match input.parse::<u32>() {
        Ok(0) | Err(_) => Err(format!("'{input}' is not a positive number")),
        Ok(jobs) => Ok(Some(jobs)),
    }
}

/// Runs the main menu until the operator starts the installation (`true`)
/// or aborts (`false`).
pub fn run(
    config: &mut InstallConfig,
    registry: &Registry,
    env: &Environment,
    exec: &mut Executor,
) -> Result<bool, InstallerError> {
    let sections: Vec<Section> = Section::iter().collect();
    let mut current = 0;

    loop {
        println!();
        let labels: Vec<String> = sections
            .iter()
            .map(|s| format!("{:<20} {}", s.to_string(), style(summary(*s, config)).dim()))
            .collect();
        current = Select::new()
            .with_prompt("Installer menu")
            .items(&labels)
            .default(current)
            .interact()?;

        match sections[current] {
            Section::Language => edit_language(config, registry)?,
            Section::Stage3 => edit_stage3(config, env)?,
            Section::BuildOptions => edit_build_options(config)?,
            Section::Disk => edit_disk(config, exec)?,
            Section::Swap => edit_swap(config, exec)?,
            Section::Hostname => {
                config.hostname = Some(text("Hostname", config.hostname.as_deref(), "gentoo")?)
            }
            Section::User => {
                config.username = Some(text("Username", config.username.as_deref(), "user")?)
            }
            Section::Authentication => edit_authentication(config)?,
            Section::Desktop => edit_desktop(config, registry)?,
            Section::Bootloader => {
                let keys: Vec<String> = registry.bootloaders().iter().map(|b| b.to_string()).collect();
                let labels: Vec<String> = keys
                    .iter()
                    .map(|k| if k == "systemd-boot" { format!("{k} (default)") } else { k.clone() })
                    .collect();
                config.bootloader = pick("Bootloader", &keys, &labels, &config.bootloader)?;
            }
            Section::Kernel => {
                let modes = registry.kernel_modes();
                let keys: Vec<String> = modes.iter().map(|m| m.to_string()).collect();
                let labels: Vec<String> = modes
                    .iter()
                    .map(|m| format!("{:<12} {}", m.to_string(), m.description()))
                    .collect();
                config.kernel = pick("Kernel", &keys, &labels, &config.kernel)?;
            }
            Section::Network => {
                let modes = registry.network_modes();
                let keys: Vec<String> = modes.iter().map(|m| m.to_string()).collect();
                let labels: Vec<String> = modes.iter().map(|m| m.description().to_string()).collect();
                config.network_mode = pick("Network", &keys, &labels, &config.network_mode)?;
            }
            Section::Save => save(config)?,
            Section::Install => {
                if !config.is_complete() {
                    ui::print_warning(&format!(
                        "Configuration incomplete, {}.",
                        summary(Section::Install, config)
                    ));
                    continue;
                }
                ui::print_summary(config);
                if Confirm::new()
                    .with_prompt("Begin installation?")
                    .default(false)
                    .interact()?
                {
                    return Ok(true);
                }
                ui::print_info("Installation not started.");
            }
            Section::Abort => {
                if Confirm::new()
                    .with_prompt("Abort installer and quit?")
                    .default(false)
                    .interact()?
                {
                    return Ok(false);
                }
            }
        }
    }
}

// ── Prompt helpers ────────────────────────────────────────────────────────────

fn text(prompt: &str, current: Option<&str>, fallback: &str) -> Result<String, InstallerError> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .default(current.filter(|c| !c.is_empty()).unwrap_or(fallback).to_string())
        .interact_text()?;
    Ok(value.trim().to_string())
}

/// Free text where an empty answer clears the value.
fn optional_text(prompt: &str, current: Option<&str>) -> Result<Option<String>, InstallerError> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .with_initial_text(current.unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn pick(
    prompt: &str,
    keys: &[String],
    labels: &[String],
    current: &str,
) -> Result<String, InstallerError> {
    let default = keys.iter().position(|k| k == current).unwrap_or(0);
    let idx = Select::new()
        .with_prompt(prompt)
        .items(labels)
        .default(default)
        .interact()?;
    Ok(keys[idx].clone())
}

fn yes_no_prompt(prompt: &str, current: bool) -> Result<bool, InstallerError> {
    Ok(Confirm::new().with_prompt(prompt).default(current).interact()?)
}

fn password(prompt: &str) -> Result<Secret, InstallerError> {
    let value = Password::new()
        .with_prompt(prompt)
        .with_confirmation("Repeat", "Passwords do not match")
        .interact()?;
    Ok(Secret::new(value))
}

// ── Sections ──────────────────────────────────────────────────────────────────

fn edit_language(config: &mut InstallConfig, registry: &Registry) -> Result<(), InstallerError> {
    let keys: Vec<String> = registry.languages.iter().map(|(code, _)| code.clone()).collect();
    let labels: Vec<String> = registry
        .languages
        .iter()
        .map(|(code, name)| format!("{code:<8} {name}"))
        .collect();
    config.language = pick("Language", &keys, &labels, &config.language)?;
    Ok(())
}

/// The environment fallback is only named in the prompt; a blank answer
/// leaves it to the stage3 step instead of copying it into the config.
pub fn stage3_prompt(env: &Environment) -> String {
    match env.stage3_tarball.as_deref() {
        Some(fallback) => format!("Path or URL of the stage3 tarball (blank = {fallback})"),
        None => "Path or URL of the stage3 tarball (blank = skip extraction)".to_string(),
    }
}

fn edit_stage3(config: &mut InstallConfig, env: &Environment) -> Result<(), InstallerError> {
    config.stage3_source = optional_text(&stage3_prompt(env), config.stage3_source.as_deref())?;
    Ok(())
}

fn edit_build_options(config: &mut InstallConfig) -> Result<(), InstallerError> {
    let current = config.makeopts_jobs.map(|j| j.to_string()).unwrap_or_default();
    let answer: String = Input::new()
        .with_prompt("MAKEOPTS jobs (blank = CPU count)")
        .with_initial_text(current)
        .allow_empty(true)
        .validate_with(|input: &String| parse_jobs(input).map(drop))
        .interact_text()?;
    config.makeopts_jobs = parse_jobs(&answer).unwrap_or(None);

    config.features_parallel_fetch =
        yes_no_prompt("Enable FEATURES=\"parallel-fetch\"?", config.features_parallel_fetch)?;
    config.emerge_keep_going =
        yes_no_prompt("Enable emerge --keep-going by default?", config.emerge_keep_going)?;
    Ok(())
}

fn select_disk(
    disks: &[DiskDescriptor],
    current: Option<&str>,
) -> Result<Option<usize>, InstallerError> {
    if disks.is_empty() {
        return Ok(None);
    }
    println!(
        "  {:<14}  {:>8}   {}",
        style("DISK").dim(),
        style("SIZE").dim(),
        style("MODEL").dim()
    );
    let labels: Vec<String> = disks.iter().map(|d| d.display()).collect();
    let default = disks
        .iter()
        .position(|d| Some(d.path.as_str()) == current)
        .unwrap_or(0);
    Ok(Some(
        Select::new()
            .with_prompt("Target disk")
            .items(&labels)
            .default(default)
            .interact()?,
    ))
}

fn edit_disk(config: &mut InstallConfig, exec: &mut Executor) -> Result<(), InstallerError> {
    let disks = lsblk::list_disks(exec);
    let selected = match select_disk(&disks, config.target_disk.as_deref())? {
        Some(idx) => {
            config.target_disk = Some(disks[idx].path.clone());
            Some(&disks[idx])
        }
        None => {
            ui::print_warning("Could not detect disks automatically.");
            config.target_disk = Some(text(
                "Target disk (e.g. /dev/sda, /dev/nvme0n1)",
                config.target_disk.as_deref(),
                "/dev/sda",
            )?);
            None
        }
    };

    let modes = [
        "auto    wipe the disk and create a new layout",
        "manual  use existing partitions",
    ];
    let mode = Select::new()
        .with_prompt("Disk mode")
        .items(&modes)
        .default(usize::from(config.disk_mode == DiskMode::Manual))
        .interact()?;

    if mode == 1 {
        config.disk_mode = DiskMode::Manual;
        match selected {
            Some(disk) if !disk.partitions.is_empty() => assign_partitions(config, disk)?,
            _ => {
                config.root_partition =
                    optional_text("Root partition", config.root_partition.as_deref())?;
                config.boot_partition = optional_text(
                    "Boot partition (blank = none)",
                    config.boot_partition.as_deref(),
                )?;
            }
        }
    } else {
        config.disk_mode = DiskMode::Auto;
        config.root_partition = None;
        config.boot_partition = None;
    }

    let uefi_default = config.use_uefi.unwrap_or_else(uefi::detect);
    config.use_uefi = Some(yes_no_prompt("Use a UEFI layout?", uefi_default)?);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
enum PartitionRole {
    #[strum(serialize = "Set as root (/)")]
    Root,
    #[strum(serialize = "Set as /boot (EFI or boot)")]
    Boot,
    #[strum(serialize = "Set as swap")]
    Swap,
    #[strum(serialize = "Mark for format as ext4")]
    FormatExt4,
    #[strum(serialize = "Mark for format as vfat (EFI)")]
    FormatVfat,
    #[strum(serialize = "Clear format flag")]
    ClearFormat,
    Back,
}

/// Tags shown next to a partition in the manual selection list.
pub fn partition_tags(path: &str, config: &InstallConfig) -> String {
    let is = |value: &Option<String>| value.as_deref() == Some(path);
    let mut tags = Vec::new();
    if is(&config.root_partition) {
        tags.push("(root)".to_string());
    }
    if is(&config.boot_partition) {
        tags.push("(boot)".to_string());
    }
    if is(&config.swap_partition) {
        tags.push("(swap)".to_string());
    }
    if let Some(fs) = config.format_partitions.get(path) {
        tags.push(format!("[fmt:{fs}]"));
    }
    tags.join(" ")
}

fn assign_partitions(config: &mut InstallConfig, disk: &DiskDescriptor) -> Result<(), InstallerError> {
    let roles: Vec<PartitionRole> = PartitionRole::iter().collect();
    loop {
        let mut labels: Vec<String> = disk
            .partitions
            .iter()
            .map(|p| format!("{}  {}", p.display(), style(partition_tags(&p.path, config)).cyan()))
            .collect();
        labels.push("Done".to_string());

        let idx = Select::new()
            .with_prompt(format!("Partitions on {}", disk.path))
            .items(&labels)
            .default(0)
            .interact()?;
        let Some(part) = disk.partitions.get(idx) else {
            return Ok(());
        };

        let role = Select::new()
            .with_prompt(part.path.as_str())
            .items(&roles)
            .default(0)
            .interact()?;
        let path = part.path.clone();
        match roles[role] {
            PartitionRole::Root => config.root_partition = Some(path),
            PartitionRole::Boot => config.boot_partition = Some(path),
            PartitionRole::Swap => config.swap_partition = Some(path),
            PartitionRole::FormatExt4 => {
                config.format_partitions.insert(path, "ext4".to_string());
            }
            PartitionRole::FormatVfat => {
                config.format_partitions.insert(path, "vfat".to_string());
            }
            PartitionRole::ClearFormat => {
                config.format_partitions.remove(&path);
            }
            PartitionRole::Back => {}
        }
    }
}

fn edit_swap(config: &mut InstallConfig, exec: &mut Executor) -> Result<(), InstallerError> {
    let partitions: Vec<_> = lsblk::list_disks(exec)
        .into_iter()
        .flat_map(|d| d.partitions)
        .collect();

    if partitions.is_empty() {
        config.swap_partition = optional_text(
            "Swap partition (blank = none)",
            config.swap_partition.as_deref(),
        )?;
        return Ok(());
    }

    let mut labels = vec!["none".to_string()];
    labels.extend(partitions.iter().map(|p| p.display()));
    let default = partitions
        .iter()
        .position(|p| config.swap_partition.as_deref() == Some(p.path.as_str()))
        .map_or(0, |i| i + 1);
    let idx = Select::new()
        .with_prompt("Swap partition")
        .items(&labels)
        .default(default)
        .interact()?;
    config.swap_partition = idx.checked_sub(1).map(|i| partitions[i].path.clone());
    Ok(())
}

fn edit_authentication(config: &mut InstallConfig) -> Result<(), InstallerError> {
    config.root_password = Some(password("Root password")?);
    config.user_password = Some(password("User password")?);
    config.user_is_sudoer =
        yes_no_prompt("Allow the user to run sudo (wheel)?", config.user_is_sudoer)?;
    Ok(())
}

fn edit_desktop(config: &mut InstallConfig, registry: &Registry) -> Result<(), InstallerError> {
    let keys: Vec<String> = registry.profiles.iter().map(|p| p.name.clone()).collect();
    let labels: Vec<String> = registry
        .profiles
        .iter()
        .map(|p| format!("{:<8} {}", p.name, p.description))
        .collect();
    let current = config.desktop_profile.clone().unwrap_or_default();
    config.desktop_profile = Some(pick("Desktop profile", &keys, &labels, &current)?);
    Ok(())
}

fn save(config: &InstallConfig) -> Result<(), InstallerError> {
    let Some(path) = optional_text("Save configuration to", Some(DEFAULT_SAVE_PATH))? else {
        ui::print_info("Save cancelled.");
        return Ok(());
    };
    let path = PathBuf::from(path);
    match config.save_to_file(&path) {
        Ok(()) => {
            info!("Configuration saved to {}", path.display());
            ui::print_success(&format!("Configuration saved to {}.", path.display()));
        }
        Err(err) => ui::print_warning(&format!("Failed to save configuration: {err}")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_lists_install_and_abort_last() {
        let sections: Vec<Section> = Section::iter().collect();
        assert_eq!(sections.first(), Some(&Section::Language));
        assert_eq!(&sections[sections.len() - 2..], [Section::Install, Section::Abort]);
        assert_eq!(Section::Disk.to_string(), "Disk configuration");
    }

    #[test]
    fn install_entry_reports_missing_fields() {
        let config = InstallConfig::default();
        let status = summary(Section::Install, &config);
        assert!(status.starts_with("missing: "));
        assert!(status.contains("target_disk"));
    }

    #[test]
    fn authentication_summary_never_shows_passwords() {
        let config = InstallConfig {
            root_password: Some(Secret::new("hunter2")),
            ..Default::default()
        };
        let status = summary(Section::Authentication, &config);
        assert!(!status.contains("hunter2"));
        assert!(status.contains("root pw: yes"));
    }

    #[test]
    fn job_count_must_be_positive() {
        assert_eq!(parse_jobs(""), Ok(None));
        assert_eq!(parse_jobs(" 12 "), Ok(Some(12)));
        assert!(parse_jobs("0").is_err());
        assert!(parse_jobs("-3").is_err());
        assert!(parse_jobs("many").is_err());
    }

    #[test]
    fn tags_show_roles_and_format_marks() {
        let mut config = InstallConfig {
            root_partition: Some("/dev/sda2".into()),
            swap_partition: Some("/dev/sda3".into()),
            ..Default::default()
        };
        config
            .format_partitions
            .insert("/dev/sda2".into(), "ext4".into());

        assert_eq!(partition_tags("/dev/sda2", &config), "(root) [fmt:ext4]");
        assert_eq!(partition_tags("/dev/sda3", &config), "(swap)");
        assert_eq!(partition_tags("/dev/sda1", &config), "");
    }

    #[test]
    fn loaded_config_without_uefi_answer_stays_incomplete() {
        let config = InstallConfig::from_json(
            r#"{"target_disk":"/dev/sda","use_uefi":null,"desktop_profile":"none",
                "hostname":"gentoo","username":"larry"}"#,
        )
        .expect("parses");

        assert_eq!(config.use_uefi, None);
        assert!(config.missing_fields().contains(&"use_uefi"));
        assert!(!config.is_complete());
        assert!(summary(Section::Install, &config).contains("use_uefi"));
    }

    #[test]
    fn stage3_prompt_names_the_environment_fallback() {
        let env = Environment {
            stage3_tarball: Some("/srv/stage3-amd64.tar.xz".into()),
            ..Default::default()
        };
        assert!(stage3_prompt(&env).contains("/srv/stage3-amd64.tar.xz"));
        assert!(stage3_prompt(&Environment::default()).contains("skip"));

        let config = InstallConfig::default();
        assert_eq!(summary(Section::Stage3, &config), "not set");
    }
}
