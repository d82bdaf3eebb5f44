//! Persisted application configuration.
//!
//! The configuration lives in a single pretty-printed JSON document
//! (`config.json`) under the application data directory. The document
//! format matches the original launcher so an existing installation
//! keeps its settings:
//!
//! ```json
//! {
//!   "destinationPath": "/home/user/Documents/My Games/FarmingSimulator2025/mods",
//!   "runAtStartup": false,
//!   "lastChecked": "2026-08-30T12:00:00Z"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Application directory name under the platform data dir.
const APP_DIR_NAME: &str = "modsync";

/// Persisted configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Directory installed files are copied into (the game's mods folder).
    pub destination_path: PathBuf,

    /// Whether an unattended sync should run at OS login.
    ///
    /// The flag itself is persisted here; registering with the OS is the
    /// caller's concern.
    pub run_at_startup: bool,

    /// When the last full sync run finished, if ever.
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            destination_path: default_destination_path(),
            run_at_startup: false,
            last_checked: None,
        }
    }
}

impl ConfigFile {
    /// Load the configuration from `path`, writing the default document
    /// first if none exists yet.
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            let initial = Self::default();
            initial.save(path)?;
            return Ok(initial);
        }

        let raw = fs::read_to_string(path).map_err(|e| SyncError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("malformed {}: {}", path.display(), e)))
    }

    /// Persist the configuration to `path`, creating parent directories
    /// as needed. Overwrites the whole document.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("serialize config: {}", e)))?;
        fs::write(path, raw).map_err(|e| SyncError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Set the destination path.
    pub fn with_destination(mut self, path: PathBuf) -> Self {
        self.destination_path = path;
        self
    }
}

/// The default destination directory for installed files.
///
/// Points at the game's mods folder under the user's documents
/// directory, falling back to the home directory and finally to the
/// current directory when neither can be resolved.
pub fn default_destination_path() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("My Games")
        .join("FarmingSimulator2025")
        .join("mods")
}

/// The application data directory (`config.json`, `cache.json`, logs).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// The default downloads directory holding the cached archives.
pub fn default_downloads_dir() -> PathBuf {
    default_data_dir().join("downloads")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert!(!config.run_at_startup);
        assert!(config.last_checked.is_none());
        assert!(config
            .destination_path
            .ends_with("My Games/FarmingSimulator2025/mods"));
    }

    #[test]
    fn test_load_initializes_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let config = ConfigFile::load(&path).unwrap();

        assert!(path.exists(), "load should create the default document");
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let config = ConfigFile::default()
            .with_destination(PathBuf::from("/games/mods"));
        config.save(&path).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.destination_path, PathBuf::from("/games/mods"));
    }

    #[test]
    fn test_document_uses_camel_case_fields() {
        let raw = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(raw.contains("destinationPath"));
        assert!(raw.contains("runAtStartup"));
        assert!(raw.contains("lastChecked"));
    }

    #[test]
    fn test_load_reads_original_document_shape() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{"destinationPath": "/mods", "runAtStartup": true, "lastChecked": null}"#,
        )
        .unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.destination_path, PathBuf::from("/mods"));
        assert!(config.run_at_startup);
        assert!(config.last_checked.is_none());
    }

    #[test]
    fn test_load_rejects_malformed_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert!(ConfigFile::load(&path).is_err());
    }
}
