use std::path::Path;

use tracing::info;

const EFIVARS: &str = "/sys/firmware/efi/efivars";

/// Detects whether the host booted in UEFI or BIOS/Legacy mode
/// by checking the presence of `/sys/firmware/efi/efivars`.
///
/// Only used as the default answer of the wizard; the pipeline follows
/// `InstallConfig::use_uefi`.
pub fn detect() -> bool {
    detect_at(Path::new(EFIVARS))
}

fn detect_at(efivars: &Path) -> bool {
    let uefi = efivars.exists();
    info!(
        "Firmware: {}",
        if uefi { "UEFI (EFI variables present)" } else { "BIOS/Legacy" }
    );
    uefi
}
