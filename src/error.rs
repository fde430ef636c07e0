use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{program}' failed with exit code {code}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Command '{0}' not found, is it installed?")]
    CommandNotFound(String),

    #[error("Installation cancelled by user")]
    Cancelled,

    #[error("This installer must be run as root when --execute is given")]
    NotRoot,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration is incomplete, missing: {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),

    #[error("Stage3 tarball not found: {}", .0.display())]
    MissingArchive(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl InstallerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Outcome of a best-effort step that did not succeed.
///
/// Callers never propagate this; they [`report`](Recoverable::report) it and
/// move on to the next step.
#[derive(Debug, Error)]
pub enum Recoverable {
    /// The tool the step needs is not installed on this system.
    #[error("'{0}' is not available on this system")]
    Unavailable(String),

    /// The step ran and failed.
    #[error(transparent)]
    Failed(InstallerError),
}

impl From<InstallerError> for Recoverable {
    fn from(err: InstallerError) -> Self {
        match err {
            InstallerError::CommandNotFound(program) => Recoverable::Unavailable(program),
            other => Recoverable::Failed(other),
        }
    }
}

impl Recoverable {
    /// Logs the failure as a warning, including stderr of a failed command.
    pub fn report(&self, step: &str) {
        match self {
            Recoverable::Unavailable(program) => {
                warn!("{step} skipped: '{program}' is not available on this system");
            }
            Recoverable::Failed(InstallerError::CommandFailed {
                program,
                code,
                stderr,
            }) if !stderr.trim().is_empty() => {
                warn!(
                    "{step} failed: '{program}' exited with code {code}: {}",
                    stderr.trim()
                );
            }
            Recoverable::Failed(err) => warn!("{step} failed: {err}"),
        }
    }
}

/// Runs a best-effort step, reporting (and swallowing) any failure.
pub fn best_effort<T>(step: &str, result: Result<T, impl Into<Recoverable>>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            err.into().report(step);
            None
        }
    }
}
