use tracing::{info, warn};

use super::Context;
use crate::{error::InstallerError, registry::DesktopProfile, ui};

/// Stage 5: installs the packages of the chosen profile and enables its
/// services.
pub fn run(ctx: &mut Context) -> Result<(), InstallerError> {
    let registry = ctx.registry;
    let name = ctx.config.desktop_profile.as_deref().unwrap_or_default();
    let Some(profile) = registry.profile(name) else {
        warn!("Unknown desktop profile '{name}'; skipping");
        ui::print_warning(&format!("Unknown desktop profile '{name}', nothing installed."));
        return Ok(());
    };

    if profile.is_empty() {
        ui::print_info("No desktop environment selected, the system stays console-only.");
        return Ok(());
    }

    install_profile(ctx, profile)?;
    ui::print_success(&format!("{} installed.", profile.description));
    Ok(())
}

fn install_profile(ctx: &mut Context, profile: &DesktopProfile) -> Result<(), InstallerError> {
    let services = if profile.services.is_empty() {
        "(none)".to_string()
    } else {
        profile.services.join(", ")
    };
    info!(
        "Profile {}: packages {}; services {services}",
        profile.name,
        profile.packages.join(", ")
    );

    if !profile.packages.is_empty() {
        let mut argv = vec!["emerge".to_string(), "--quiet-build=n".to_string()];
        argv.extend(profile.packages.iter().cloned());
        ctx.chroot(&argv)?;
    }
    for service in &profile.services {
        ctx.chroot(&["systemctl", "enable", service.as_str()])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::{ExecMode, Executor},
        config::{Environment, InstallConfig},
        registry::Registry,
        ui::Interactive,
    };

    fn dry_run(profile: &str) -> Vec<String> {
        let config = InstallConfig {
            desktop_profile: Some(profile.to_string()),
            ..Default::default()
        };
        let registry = Registry::builtin();
        let env = Environment::default();
        let exec = Executor::new(ExecMode::DryRun);
        let mut ctx = Context::new(&config, &registry, &env, exec, Box::new(Interactive));

        run(&mut ctx).unwrap();
        ctx.exec.history().to_vec()
    }

    #[test]
    fn profile_packages_then_services() {
        let history = dry_run("xfce");
        assert_eq!(
            history,
            [
                "chroot /mnt/gentoo emerge --quiet-build=n xfce-base/xfce4-meta",
                "chroot /mnt/gentoo systemctl enable lightdm",
            ]
        );
    }

    #[test]
    fn none_profile_records_nothing() {
        assert!(dry_run("none").is_empty());
    }

    #[test]
    fn unknown_profile_is_skipped() {
        assert!(dry_run("kde").is_empty());
        assert!(dry_run("").is_empty());
    }
}
