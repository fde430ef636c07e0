//! Option tables offered by the wizard and consulted by the pipeline.
//!
//! Everything here is immutable once built. The pipeline receives a
//! `&Registry`, so tests can hand it a fixture instead of the built-in tables.

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// A named bundle of packages and services installed on top of the base system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopProfile {
    pub name: String,
    pub description: String,
    pub packages: Vec<String>,
    pub services: Vec<String>,
}

impl DesktopProfile {
    pub fn new(name: &str, description: &str, packages: &[&str], services: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
            services: services.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The console-only profile performs no installation at all.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.services.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Bootloader {
    SystemdBoot,
    Grub,
    Efistub,
    Limine,
    Refind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum KernelMode {
    /// Prebuilt distribution kernel (`gentoo-kernel-bin`).
    DistKernel,
    /// Sources plus `genkernel all`.
    Genkernel,
    /// Sources only; the operator builds the kernel.
    Manual,
}

impl KernelMode {
    pub fn description(self) -> &'static str {
        match self {
            KernelMode::DistKernel => "prebuilt distribution kernel (fastest)",
            KernelMode::Genkernel => "gentoo-sources built with genkernel",
            KernelMode::Manual => "gentoo-sources only, configure and build yourself",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum NetworkMode {
    /// Keep the network configuration copied from the installation media.
    CopyIso,
    /// Leave networking to the operator.
    Manual,
    /// NetworkManager with its default wireless backend.
    NmDefault,
    /// NetworkManager with iwd as wireless backend.
    NmIwd,
}

impl NetworkMode {
    pub fn uses_network_manager(self) -> bool {
        matches!(self, NetworkMode::NmDefault | NetworkMode::NmIwd)
    }

    pub fn description(self) -> &'static str {
        match self {
            NetworkMode::CopyIso => "copy network config from the installation media",
            NetworkMode::Manual => "configure networking later",
            NetworkMode::NmDefault => "NetworkManager (default backend)",
            NetworkMode::NmIwd => "NetworkManager (iwd backend)",
        }
    }
}

const LANGUAGES: &[(&str, &str)] = &[
    ("en_US", "English (US)"),
    ("pl_PL", "Polish"),
    ("de_DE", "German"),
    ("fr_FR", "French"),
    ("es_ES", "Spanish"),
    ("pt_BR", "Brazilian Portuguese"),
    ("it_IT", "Italian"),
    ("ru_RU", "Russian"),
    ("uk_UA", "Ukrainian"),
    ("tr_TR", "Turkish"),
    ("cs_CZ", "Czech"),
    ("nl_NL", "Dutch"),
    ("sv_SE", "Swedish"),
    ("fi_FI", "Finnish"),
    ("et_EE", "Estonian"),
    ("lt_LT", "Lithuanian"),
    ("el_GR", "Greek"),
    ("hu_HU", "Hungarian"),
    ("zh_CN", "Chinese (simplified)"),
    ("ja_JP", "Japanese"),
    ("ko_KR", "Korean"),
    ("ar_EG", "Arabic"),
];

#[derive(Debug, Clone)]
pub struct Registry {
    pub profiles: Vec<DesktopProfile>,
    pub languages: Vec<(String, String)>,
}

impl Registry {
    /// The tables shipped with the installer.
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                DesktopProfile::new(
                    "none",
                    "No desktop environment (console-only system)",
                    &[],
                    &[],
                ),
                DesktopProfile::new(
                    "gnome",
                    "GNOME desktop environment",
                    &["gnome-base/gnome"],
                    &["gdm"],
                ),
                DesktopProfile::new(
                    "plasma",
                    "KDE Plasma desktop environment",
                    &["kde-plasma/plasma-meta"],
                    &["sddm"],
                ),
                DesktopProfile::new(
                    "xfce",
                    "Xfce desktop environment",
                    &["xfce-base/xfce4-meta"],
                    &["lightdm"],
                ),
            ],
            languages: LANGUAGES
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        }
    }

    pub fn profile(&self, name: &str) -> Option<&DesktopProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn bootloaders(&self) -> Vec<Bootloader> {
        Bootloader::iter().collect()
    }

    pub fn kernel_modes(&self) -> Vec<KernelMode> {
        KernelMode::iter().collect()
    }

    pub fn network_modes(&self) -> Vec<NetworkMode> {
        NetworkMode::iter().collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
