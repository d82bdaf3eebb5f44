//! CLI error type.

use std::fmt;

use modsync::SyncError;

/// Errors surfaced to the terminal with a non-zero exit code.
#[derive(Debug)]
pub enum CliError {
    /// An engine operation failed.
    Sync(SyncError),
    /// Some files in a batch failed; carries the count.
    PartialFailure(usize),
    /// Invalid invocation or configuration.
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Sync(e) => write!(f, "{e}"),
            CliError::PartialFailure(n) => write!(f, "{n} file(s) failed"),
            CliError::Usage(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        CliError::Sync(e)
    }
}
