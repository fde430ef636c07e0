//! Guided Gentoo Linux installer.
//!
//! Settings are collected into an [`InstallConfig`] by the [`wizard`], then a
//! fixed pipeline ([`steps::run_pipeline`]) turns them into a mounted,
//! configured system. Every privileged operation goes through
//! [`cmd::Executor`], which either performs it or only records it (dry-run).

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod logging;
pub mod lsblk;
pub mod registry;
pub mod steps;
pub mod ui;
pub mod wizard;

pub use cmd::{Backend, ExecMode, Executor, Finished};
pub use config::{Credentials, DiskMode, Environment, InstallConfig, Secret};
pub use error::{InstallerError, Recoverable};
pub use registry::Registry;
pub use steps::{run_pipeline, Context};
