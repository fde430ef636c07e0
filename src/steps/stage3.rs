use std::{fs, path::PathBuf};

use tracing::{info, warn};

use super::{fstab, Context};
use crate::{error::InstallerError, ui};

const FALLBACK_NAME: &str = "gentoo-stage3.tar.xz";

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// File name a downloaded tarball is stored under.
pub fn download_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains(':') => name.to_string(),
        _ => FALLBACK_NAME.to_string(),
    }
}

/// Stage 2: extracts the stage3 tarball into the root, then writes fstab.
pub fn run(ctx: &mut Context) -> Result<(), InstallerError> {
    let root = ctx.root.clone();
    ctx.exec.create_dir_all(&root)?;

    let source = ctx
        .config
        .stage3_source
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| ctx.env.stage3_tarball.clone());
    let Some(source) = source else {
        warn!("No stage3 source configured (config or GENTOO_STAGE3_TARBALL); skipping extraction");
        ui::print_warning("No stage3 source configured, skipping extraction.");
        return Ok(());
    };

    let (tarball, downloaded) = if is_url(&source) {
        let dest = ctx.env.scratch_dir.join(download_name(&source));
        let dest_str = dest.display().to_string();
        info!("Downloading stage3 from {source} to {dest_str}");
        ctx.exec.run(&["wget", "-O", &dest_str, &source])?;
        (dest, true)
    } else {
        (PathBuf::from(&source), false)
    };

    // A dry-run never downloads, so only a local path can be checked there.
    let checkable = !(downloaded && ctx.exec.is_dry_run());
    if checkable && !tarball.exists() {
        return Err(InstallerError::MissingArchive(tarball));
    }

    if !ctx.exec.is_dry_run() && fs::read_dir(&root)?.next().is_some() {
        warn!("{} is not empty, stage3 will be extracted on top", root.display());
    }

    let tarball_str = tarball.display().to_string();
    ctx.exec.run_quiet(
        &[
            "tar",
            "xpf",
            &tarball_str,
            "-C",
            &ctx.root_str(),
            "--xattrs-include=*",
            "--numeric-owner",
        ],
        "Extracting stage3…",
    )?;
    ui::print_success(&format!("stage3 extracted into {}.", root.display()));

    fstab::generate(ctx)
}
