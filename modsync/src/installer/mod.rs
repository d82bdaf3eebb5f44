//! Installs downloaded archives into the destination directory.
//!
//! Copies are atomic within the destination: bytes land in a `.tmp`
//! sibling first and are renamed into place, so a crash mid-copy never
//! leaves a truncated archive where the game expects a whole one.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::fetch::checksum::sha256_file;

/// Outcome of installing a set of files.
#[derive(Debug, Default, PartialEq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Whether source and destination differ in content.
///
/// Size is checked first as a cheap reject; only equal sizes pay for
/// hashing both files. Either file missing counts as different.
pub fn files_are_different(source: &Path, dest: &Path) -> SyncResult<bool> {
    if !source.exists() || !dest.exists() {
        return Ok(true);
    }

    let source_len = source
        .metadata()
        .map_err(|e| SyncError::ReadFailed {
            path: source.to_path_buf(),
            source: e,
        })?
        .len();
    let dest_len = dest
        .metadata()
        .map_err(|e| SyncError::ReadFailed {
            path: dest.to_path_buf(),
            source: e,
        })?
        .len();
    if source_len != dest_len {
        return Ok(true);
    }

    Ok(sha256_file(source)? != sha256_file(dest)?)
}

/// Copy `source` over `dest` through a temporary sibling.
pub fn atomic_copy(source: &Path, dest: &Path) -> SyncResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp = dest.with_extension(match dest.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    fs::copy(source, &temp).map_err(|e| SyncError::WriteFailed {
        path: temp.clone(),
        source: e,
    })?;

    fs::rename(&temp, dest).map_err(|e| {
        let _ = fs::remove_file(&temp);
        SyncError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        }
    })
}

/// Copies verified archives from the download cache into the
/// destination directory.
pub struct Installer {
    cache_dir: PathBuf,
    dest_dir: PathBuf,
}

impl Installer {
    pub fn new(cache_dir: PathBuf, dest_dir: PathBuf) -> Self {
        Self { cache_dir, dest_dir }
    }

    /// Install the named files, skipping ones already identical at the
    /// destination. A failed copy is recorded and the rest continue.
    pub fn install(&self, filenames: &[String]) -> InstallReport {
        let mut report = InstallReport::default();

        for filename in filenames {
            let source = self.cache_dir.join(filename);
            let dest = self.dest_dir.join(filename);

            if !source.exists() {
                report.failed.push((
                    filename.clone(),
                    "not present in the download cache".to_string(),
                ));
                continue;
            }

            match files_are_different(&source, &dest) {
                Ok(false) => {
                    info!(file = %filename, "destination already matches, skipping");
                    report.skipped.push(filename.clone());
                }
                Ok(true) => match atomic_copy(&source, &dest) {
                    Ok(()) => {
                        info!(file = %filename, dest = %dest.display(), "installed");
                        report.installed.push(filename.clone());
                    }
                    Err(e) => {
                        warn!(file = %filename, error = %e, "install copy failed");
                        report.failed.push((filename.clone(), e.to_string()));
                    }
                },
                Err(e) => {
                    warn!(file = %filename, error = %e, "could not compare files");
                    report.failed.push((filename.clone(), e.to_string()));
                }
            }
        }

        report
    }

    /// Install the named files unconditionally, overwriting the
    /// destination even when it already matches. Reinstall path: the
    /// point is a pristine copy, not saving a copy we could skip.
    pub fn force_install(&self, filenames: &[String]) -> InstallReport {
        let mut report = InstallReport::default();

        for filename in filenames {
            let source = self.cache_dir.join(filename);
            let dest = self.dest_dir.join(filename);

            if !source.exists() {
                report.failed.push((
                    filename.clone(),
                    "not present in the download cache".to_string(),
                ));
                continue;
            }

            match atomic_copy(&source, &dest) {
                Ok(()) => {
                    info!(file = %filename, dest = %dest.display(), "reinstalled");
                    report.installed.push(filename.clone());
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "install copy failed");
                    report.failed.push((filename.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
