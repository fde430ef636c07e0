use std::path::PathBuf;

use clap::Parser;

use crate::logging::DEFAULT_LOG_FILE;

/// Guided Gentoo Linux installer
#[derive(Debug, Parser)]
#[command(name = "gentoo-installer")]
#[command(about = "Guided Gentoo Linux installer (stage3 + Portage)")]
#[command(version)]
pub struct Cli {
    /// Perform the installation. Without this flag every destructive
    /// operation is only logged (dry-run).
    #[arg(long)]
    pub execute: bool,

    /// Load install settings from this JSON document before the wizard starts
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the final settings (without passwords) to this JSON document
    #[arg(long, value_name = "FILE")]
    pub save_config: Option<PathBuf>,

    /// Load the root and user passwords from this JSON document
    #[arg(long, value_name = "FILE")]
    pub creds: Option<PathBuf>,

    /// Write the root and user passwords to this JSON document
    #[arg(long, value_name = "FILE")]
    pub save_creds: Option<PathBuf>,

    /// Log file receiving a full copy of the log
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
