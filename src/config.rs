use std::{collections::BTreeMap, fmt, fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InstallerError;

pub const SCHEMA_VERSION: u32 = 1;

const DEFAULT_ACCEPT_LICENSE: &str = "-* @FREE @BINARY-REDISTRIBUTABLE";

// ── Secrets ───────────────────────────────────────────────────────────────────

/// A password. Never printed by `Debug`, only reachable through [`Secret::expose`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

// ── Install intent ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskMode {
    /// Wipe the target disk and create a fresh layout.
    #[default]
    Auto,
    /// Reuse existing partitions; the partition table is left alone.
    Manual,
}

/// Everything the operator decided about the installation.
///
/// Mutated in place while the wizard runs, then handed to the pipeline as a
/// shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub schema_version: u32,

    pub language: String,

    /// Local path or http(s) URL of the stage3 tarball.
    pub stage3_source: Option<String>,

    // Portage build options
    pub makeopts_jobs: Option<u32>,
    pub features_parallel_fetch: bool,
    pub emerge_keep_going: bool,

    // Disk
    pub target_disk: Option<String>,
    pub disk_mode: DiskMode,
    pub root_partition: Option<String>,
    pub boot_partition: Option<String>,
    pub swap_partition: Option<String>,
    /// Partition path -> filesystem to create. Manual mode only.
    pub format_partitions: BTreeMap<String, String>,
    pub root_fs: String,
    pub use_uefi: Option<bool>,

    // System
    pub desktop_profile: Option<String>,
    pub hostname: Option<String>,
    pub username: Option<String>,

    // Authentication
    #[serde(skip)]
    pub root_password: Option<Secret>,
    #[serde(skip)]
    pub user_password: Option<Secret>,
    pub user_is_sudoer: bool,

    // Boot, kernel, network
    pub bootloader: String,
    pub kernel: String,
    pub network_mode: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            language: "en_US".to_string(),
            stage3_source: None,
            makeopts_jobs: None,
            features_parallel_fetch: true,
            emerge_keep_going: false,
            target_disk: None,
            disk_mode: DiskMode::Auto,
            root_partition: None,
            boot_partition: None,
            swap_partition: None,
            format_partitions: BTreeMap::new(),
            root_fs: "ext4".to_string(),
            use_uefi: None,
            desktop_profile: None,
            hostname: None,
            username: None,
            root_password: None,
            user_password: None,
            user_is_sudoer: true,
            bootloader: "systemd-boot".to_string(),
            kernel: "dist-kernel".to_string(),
            network_mode: "copy_iso".to_string(),
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn secret_present(value: &Option<Secret>) -> bool {
    value.as_ref().is_some_and(|s| !s.is_empty())
}

impl InstallConfig {
    /// Names of the required fields that are still missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let disk = match self.disk_mode {
            DiskMode::Manual => ("root_partition", present(&self.root_partition)),
            DiskMode::Auto => ("target_disk", present(&self.target_disk)),
        };

        [
            ("language", !self.language.is_empty()),
            disk,
            ("root_fs", !self.root_fs.is_empty()),
            ("use_uefi", self.use_uefi.is_some()),
            ("desktop_profile", present(&self.desktop_profile)),
            ("hostname", present(&self.hostname)),
            ("username", present(&self.username)),
            ("root_password", secret_present(&self.root_password)),
            ("user_password", secret_present(&self.user_password)),
            ("bootloader", !self.bootloader.is_empty()),
            ("kernel", !self.kernel.is_empty()),
            ("network_mode", !self.network_mode.is_empty()),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect()
    }

    /// True when the configuration can be handed to the installation pipeline.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Fails with [`InstallerError::Incomplete`] unless [`is_complete`](Self::is_complete).
    pub fn ensure_complete(&self) -> Result<(), InstallerError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InstallerError::Incomplete(missing))
        }
    }

    /// UTF-8 locale identifier for the configured language, e.g. `pl_PL.UTF-8`.
    pub fn locale_id(&self) -> String {
        let lang = if self.language.is_empty() {
            "en_US"
        } else {
            self.language.as_str()
        };
        if lang.contains('.') {
            lang.to_string()
        } else {
            format!("{lang}.UTF-8")
        }
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Encodes everything except the passwords.
    pub fn to_json(&self) -> Result<String, InstallerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, InstallerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), InstallerError> {
        fs::write(path, self.to_json()? + "\n")?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, InstallerError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

// ── Credentials document ──────────────────────────────────────────────────────

/// The two passwords, stored apart from the main configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_password: Option<Secret>,
}

impl Credentials {
    pub fn from_config(config: &InstallConfig) -> Self {
        Self {
            root_password: config.root_password.clone(),
            user_password: config.user_password.clone(),
        }
    }

    /// Copies the passwords present in this document into `config`.
    pub fn apply_to(self, config: &mut InstallConfig) {
        if let Some(pw) = self.root_password {
            config.root_password = Some(pw);
        }
        if let Some(pw) = self.user_password {
            config.user_password = Some(pw);
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), InstallerError> {
        fs::write(path, serde_json::to_string_pretty(self)? + "\n")?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, InstallerError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

// ── Host environment ──────────────────────────────────────────────────────────

/// Values taken from the installer's own process environment.
///
/// Captured once at startup so every stage (and every dry-run) sees the same
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// `GENTOO_STAGE3_TARBALL`: fallback when the config names no stage3 source.
    pub stage3_tarball: Option<String>,
    /// `GENTOO_TIMEZONE`, defaults to `UTC`.
    pub timezone: String,
    /// `GENTOO_ACCEPT_LICENSE`.
    pub accept_license: String,
    pub cpu_count: u32,
    /// Where downloaded tarballs are stored.
    pub scratch_dir: PathBuf,
}

impl Environment {
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            stage3_tarball: var("GENTOO_STAGE3_TARBALL"),
            timezone: var("GENTOO_TIMEZONE").unwrap_or_else(|| "UTC".to_string()),
            accept_license: var("GENTOO_ACCEPT_LICENSE")
                .unwrap_or_else(|| DEFAULT_ACCEPT_LICENSE.to_string()),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(2),
            scratch_dir: PathBuf::from("/tmp"),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            stage3_tarball: None,
            timezone: "UTC".to_string(),
            accept_license: DEFAULT_ACCEPT_LICENSE.to_string(),
            cpu_count: 2,
            scratch_dir: PathBuf::from("/tmp"),
        }
    }
}
