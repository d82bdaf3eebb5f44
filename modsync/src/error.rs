//! Error types for the sync engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync, download and install operations.
///
/// Only a small subset of these is fatal to a whole sync run: a failed
/// catalog fetch aborts before any transfer starts, while per-file
/// failures are reported through the event stream and accumulated into
/// the batch report.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote catalog could not be fetched or parsed.
    ///
    /// Fatal to the sync attempt: no queue is built.
    #[error("catalog unavailable ({url}): {reason}")]
    CatalogUnavailable { url: String, reason: String },

    /// Every transport strategy failed for a file.
    #[error("failed to download {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a markup page instead of the expected
    /// binary, which signals an error page behind a 200 response.
    #[error("unexpected content type {content_type:?} from {url}")]
    UnexpectedContentType { url: String, content_type: String },

    /// The cache ledger could not be persisted.
    ///
    /// Never fatal: callers log and keep using the in-memory ledger.
    #[error("failed to write cache ledger {path}: {source}")]
    CacheStoreWrite { path: PathBuf, source: io::Error },

    /// Failed to read a file or directory.
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// A single install copy failed; remaining installs still run.
    #[error("failed to install {filename}: {reason}")]
    InstallCopy { filename: String, reason: String },

    /// A filename was requested that the cache ledger does not track.
    #[error("{filename} is not tracked by the cache ledger")]
    NotTracked { filename: String },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
