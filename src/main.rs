use std::path::Path;

use tracing::{info, warn};

use gentoo_installer::{
    cli::Cli,
    logging,
    steps::{run_pipeline, Context},
    ui::{self, Interactive},
    wizard, Credentials, Environment, ExecMode, Executor, InstallConfig, InstallerError, Registry,
};

fn main() {
    let cli = Cli::parse_args();
    logging::init(&cli.log_file);

    match run(&cli) {
        Ok(()) => {}
        Err(InstallerError::Cancelled) => {
            println!();
            ui::print_warning("Installer aborted, nothing was installed.");
            std::process::exit(1);
        }
        Err(e) => {
            println!();
            ui::print_error(&format!("{}", e));
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<(), InstallerError> {
    let mode = if cli.execute { ExecMode::Live } else { ExecMode::DryRun };

    // ── Guard ─────────────────────────────────────────────────────────────────
    if mode == ExecMode::Live {
        check_root()?;
    }

    // ── Welcome ───────────────────────────────────────────────────────────────
    ui::print_banner();
    if mode == ExecMode::DryRun {
        ui::print_warning("DRY-RUN MODE: commands are logged, nothing is executed. Pass --execute to install.");
    }
    ui::print_info("You will be asked before each destructive operation.");

    // ── Settings ──────────────────────────────────────────────────────────────
    let mut config = cli
        .config
        .as_deref()
        .and_then(|path| load_or_warn("configuration", path, InstallConfig::load_from_file))
        .unwrap_or_default();
    if let Some(creds) = cli
        .creds
        .as_deref()
        .and_then(|path| load_or_warn("credentials", path, Credentials::load_from_file))
    {
        creds.apply_to(&mut config);
    }

    let registry = Registry::builtin();
    let env = Environment::from_process();
    let mut exec = Executor::new(mode);

    if !wizard::run(&mut config, &registry, &env, &mut exec)? {
        return Err(InstallerError::Cancelled);
    }

    if let Some(path) = cli.save_config.as_deref() {
        save_or_warn("configuration", path, config.save_to_file(path));
    }
    if let Some(path) = cli.save_creds.as_deref() {
        save_or_warn(
            "credentials",
            path,
            Credentials::from_config(&config).save_to_file(path),
        );
    }

    // ── Install ───────────────────────────────────────────────────────────────
    let mut ctx = Context::new(&config, &registry, &env, exec, Box::new(Interactive));
    run_pipeline(&mut ctx)
}

fn load_or_warn<T>(
    what: &str,
    path: &Path,
    load: fn(&Path) -> Result<T, InstallerError>,
) -> Option<T> {
    match load(path) {
        Ok(value) => {
            info!("Loaded {what} from {}", path.display());
            Some(value)
        }
        Err(err) => {
            warn!("Could not load {what} from {}: {err}; starting without it", path.display());
            None
        }
    }
}

fn save_or_warn(what: &str, path: &Path, result: Result<(), InstallerError>) {
    match result {
        Ok(()) => info!("Saved {what} to {}", path.display()),
        Err(err) => warn!("Could not save {what} to {}: {err}", path.display()),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Checks that the process is running as root (UID 0).
fn check_root() -> Result<(), InstallerError> {
    let uid = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("Uid:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|v| v.parse::<u32>().ok())
        })
        .unwrap_or(1); // default to non-root if unreadable

    if uid != 0 {
        return Err(InstallerError::NotRoot);
    }

    Ok(())
}
