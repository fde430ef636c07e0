//! The installation pipeline: six stages run in a fixed order against one
//! read-only [`InstallConfig`].

pub mod base;
pub mod bootloader;
pub mod chroot;
pub mod desktop;
pub mod disk;
pub mod finalize;
pub mod fstab;
pub mod stage3;
pub mod uefi;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    cmd::Executor,
    config::{Environment, InstallConfig},
    error::InstallerError,
    registry::Registry,
    ui::{self, Prompter},
};

/// Where the new system is mounted while it is being installed.
pub const INSTALL_ROOT: &str = "/mnt/gentoo";

/// Everything a stage needs.
pub struct Context<'a> {
    pub config: &'a InstallConfig,
    pub registry: &'a Registry,
    pub env: &'a Environment,
    pub exec: Executor,
    pub prompter: Box<dyn Prompter + 'a>,
    pub root: PathBuf,
}

impl<'a> Context<'a> {
    pub fn new(
        config: &'a InstallConfig,
        registry: &'a Registry,
        env: &'a Environment,
        exec: Executor,
        prompter: Box<dyn Prompter + 'a>,
    ) -> Self {
        Self {
            config,
            registry,
            env,
            exec,
            prompter,
            root: PathBuf::from(INSTALL_ROOT),
        }
    }

    /// Mounts the new system somewhere other than [`INSTALL_ROOT`].
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// `rel` resolved inside the target root.
    pub fn target(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_start_matches('/'))
    }

    pub fn root_str(&self) -> String {
        self.root.display().to_string()
    }

    pub fn chroot<S: AsRef<str>>(&mut self, argv: &[S]) -> Result<(), InstallerError> {
        let root: &Path = &self.root;
        self.exec.run_in_chroot(root, argv)
    }
}

type Stage = fn(&mut Context) -> Result<(), InstallerError>;

const STAGES: [(&str, Stage, bool); 6] = [
    ("Mount target", disk::run, true),
    ("Install stage3", stage3::run, true),
    ("Configure base system", base::run, false),
    ("Install bootloader", bootloader::run, false),
    ("Install desktop profile", desktop::run, false),
    ("Finalize accounts and services", finalize::run, false),
];

/// Runs every stage in order.
///
/// A failure in the first two stages aborts the run: nothing after them can
/// work without a mounted, populated root. Later stages are allowed to fail;
/// the failure is logged and the next stage runs.
pub fn run_pipeline(ctx: &mut Context) -> Result<(), InstallerError> {
    ctx.config.ensure_complete()?;

    info!(
        "Starting installation pipeline ({})",
        if ctx.exec.is_dry_run() { "dry-run" } else { "live" }
    );

    for (idx, (title, stage, fatal)) in STAGES.iter().enumerate() {
        ui::print_step(idx + 1, STAGES.len(), title);
        match stage(ctx) {
            Ok(()) => {}
            Err(err) if *fatal => return Err(err),
            Err(err) => {
                warn!("Stage '{title}' did not complete: {err}");
                ui::print_warning(&format!("{title} did not complete, continuing."));
            }
        }
    }

    info!("Pipeline finished");
    if ctx.exec.is_dry_run() {
        ui::print_info("This was a dry-run. No real changes were made.");
    } else {
        ui::print_success("Installation finished.");
        ui::print_info(&format!(
            "Unmount and reboot when you are ready:  umount -R {} && reboot",
            ctx.root_str()
        ));
    }
    Ok(())
}
