//! Stage 3: turns the extracted stage3 into a configured system.

use console::style;
use tracing::{info, warn};

use super::{chroot, Context};
use crate::{
    error::{best_effort, InstallerError},
    registry::KernelMode,
    ui,
};

const MAKE_CONF: &str = "etc/portage/make.conf";
const REPOS_TEMPLATE: &str = "usr/share/portage/config/repos.conf";
const REPOS_CONF: &str = "etc/portage/repos.conf/gentoo.conf";

pub fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n\
         127.0.1.1\t{hostname}\n\
         ::1\tlocalhost ip6-localhost ip6-loopback\n"
    )
}

/// Portage build options appended to `make.conf`.
pub fn make_conf_block(jobs: u32, parallel_fetch: bool, keep_going: bool, license: &str) -> String {
    let mut emerge_opts = format!("--jobs={jobs} --load-average={jobs}");
    if keep_going {
        emerge_opts.push_str(" --keep-going");
    }

    let mut block = format!("MAKEOPTS=\"-j{jobs}\"\nEMERGE_DEFAULT_OPTS=\"{emerge_opts}\"\n");
    if parallel_fetch {
        block.push_str("FEATURES=\"parallel-fetch\"\n");
    }
    block.push_str(&format!("ACCEPT_LICENSE=\"{license}\"\n"));
    block
}

/// The `CPU_FLAGS_X86: ...` line printed last by `cpuid2cpuflags`.
pub fn cpu_flags_line(output: &str) -> Option<&str> {
    output
        .trim()
        .lines()
        .last()
        .map(str::trim)
        .filter(|line| line.contains("CPU_FLAGS_X86"))
}

/// `emerge` invocations installing the kernel for `mode`.
pub fn kernel_commands(mode: KernelMode) -> Vec<Vec<&'static str>> {
    match mode {
        KernelMode::DistKernel => {
            vec![vec!["emerge", "--quiet-build=n", "sys-kernel/gentoo-kernel-bin"]]
        }
        KernelMode::Genkernel => vec![
            vec!["emerge", "sys-kernel/gentoo-sources", "sys-kernel/genkernel"],
            vec!["genkernel", "all"],
        ],
        KernelMode::Manual => vec![vec!["emerge", "sys-kernel/gentoo-sources"]],
    }
}

pub fn run(ctx: &mut Context) -> Result<(), InstallerError> {
    let root = ctx.root.clone();
    chroot::establish(&mut ctx.exec, &root)?;
    chroot::copy_resolver(&mut ctx.exec, &root)?;

    write_identity(ctx)?;
    write_locale(ctx)?;
    write_timezone(ctx)?;
    configure_portage(ctx)?;

    best_effort(
        "Linking /etc/mtab",
        ctx.exec.symlink("/proc/self/mounts", &ctx.target("etc/mtab")),
    );

    best_effort("Kernel installation", install_kernel(ctx));

    info!("Kernel mode: {}, network mode: {}", ctx.config.kernel, ctx.config.network_mode);
    ui::print_success("Base system configured.");
    Ok(())
}

fn write_identity(ctx: &mut Context) -> Result<(), InstallerError> {
    let Some(hostname) = ctx.config.hostname.as_deref().filter(|h| !h.is_empty()) else {
        return Ok(());
    };
    info!("Setting hostname to {hostname}");
    ctx.exec
        .write_file(&ctx.target("etc/hostname"), &format!("{hostname}\n"))?;
    ctx.exec
        .write_file(&ctx.target("etc/hosts"), &hosts_file(hostname))
}

fn write_locale(ctx: &mut Context) -> Result<(), InstallerError> {
    let locale = ctx.config.locale_id();
    info!("Configuring locale {locale}");

    // locale.gen is replaced, not merged, so only this locale gets built.
    ctx.exec
        .write_file(&ctx.target("etc/locale.gen"), &format!("{locale} UTF-8\n"))?;
    best_effort("locale-gen", ctx.chroot(&["locale-gen"]));
    ctx.exec
        .write_file(&ctx.target("etc/locale.conf"), &format!("LANG={locale}\n"))
}

fn write_timezone(ctx: &mut Context) -> Result<(), InstallerError> {
    let timezone = ctx.env.timezone.clone();
    info!("Setting timezone to {timezone}");
    ctx.exec
        .write_file(&ctx.target("etc/timezone"), &format!("{timezone}\n"))?;
    best_effort(
        "Configuring sys-libs/timezone-data",
        ctx.chroot(&["emerge", "--config", "sys-libs/timezone-data"]),
    );
    Ok(())
}

fn configure_portage(ctx: &mut Context) -> Result<(), InstallerError> {
    let make_conf = ctx.target(MAKE_CONF);
    let jobs = ctx.config.makeopts_jobs.unwrap_or(ctx.env.cpu_count).max(1);
    info!("Writing build options to {} (jobs={jobs})", make_conf.display());
    let block = make_conf_block(
        jobs,
        ctx.config.features_parallel_fetch,
        ctx.config.emerge_keep_going,
        &ctx.env.accept_license,
    );
    ctx.exec.append_file(&make_conf, &block)?;

    if let Some(mirrors) = best_effort(
        "Selecting mirrors",
        ctx.exec.capture(&["mirrorselect", "-D", "-s4", "-o"]),
    ) {
        let mirrors = mirrors.trim();
        if !mirrors.is_empty() {
            info!("mirrorselect: {mirrors}");
            ctx.exec.append_file(&make_conf, &format!("\n{mirrors}\n"))?;
        }
    }

    let template = ctx.target(REPOS_TEMPLATE);
    if template.exists() {
        ctx.exec.copy_file(&template, &ctx.target(REPOS_CONF))?;
    } else {
        warn!("Portage repos.conf template not found at {}", template.display());
    }

    ui::print_info("Syncing the Portage tree, this can take a while…");
    best_effort("emerge --sync", ctx.chroot(&["emerge", "--sync"]));

    best_effort("Detecting CPU_FLAGS_X86", detect_cpu_flags(ctx));
    Ok(())
}

fn detect_cpu_flags(ctx: &mut Context) -> Result<(), InstallerError> {
    ctx.chroot(&["emerge", "--noreplace", "app-portage/cpuid2cpuflags"])?;
    if ctx.exec.is_dry_run() {
        return Ok(());
    }

    let root = ctx.root.clone();
    let output = ctx.exec.capture_in_chroot(&root, &["cpuid2cpuflags"])?;
    match cpu_flags_line(&output) {
        Some(line) => {
            info!("cpuid2cpuflags: {line}");
            ctx.exec
                .append_file(&ctx.target(MAKE_CONF), &format!("{line}\n"))
        }
        None => {
            warn!("cpuid2cpuflags did not print a CPU_FLAGS_X86 line");
            Ok(())
        }
    }
}

fn install_kernel(ctx: &mut Context) -> Result<(), InstallerError> {
    let Ok(mode) = ctx.config.kernel.parse::<KernelMode>() else {
        warn!("Unknown kernel mode '{}'; skipping kernel installation", ctx.config.kernel);
        return Ok(());
    };

    ui::print_info(&format!(
        "Installing kernel ({})…",
        style(mode.description()).cyan().bold()
    ));
    best_effort(
        "Installing sys-kernel/linux-firmware",
        ctx.chroot(&["emerge", "--quiet-build=n", "sys-kernel/linux-firmware"]),
    );

    for command in kernel_commands(mode) {
        ctx.chroot(&command)?;
    }

    if mode == KernelMode::Manual {
        ui::print_info("Kernel sources installed. Configure and build the kernel inside the chroot.");
    } else {
        ui::print_success("Kernel installed.");
    }
    Ok(())
}
