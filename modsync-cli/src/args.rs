//! CLI argument types (clap-derived).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default catalog page scraped for downloadable archives.
pub const DEFAULT_CATALOG_URL: &str = "http://141.95.14.181:27047/mods.html?lang=en";

/// Keep a local mod collection in sync with a remote catalog.
#[derive(Debug, Parser)]
#[command(name = "modsync", version, about)]
pub struct Cli {
    /// Catalog page URL
    #[arg(long, global = true, default_value = DEFAULT_CATALOG_URL)]
    pub catalog_url: String,

    /// Application data directory (config, cache ledger, logs)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run an unattended sync followed by install of everything cached,
    /// with no prompts. Intended for login scripts.
    #[arg(long)]
    pub auto_sync: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check the catalog and download new or updated archives
    Sync {
        /// Number of simultaneous downloads
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
    /// Copy cached archives into the destination directory
    Install {
        /// Install everything in the download cache
        #[arg(long, conflicts_with = "files")]
        all: bool,

        /// Specific archives to install
        files: Vec<String>,
    },
    /// Discard cached copies, re-download and install
    Reinstall {
        /// Archives to reinstall
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// List cached archives with size and hash
    List,
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Change the install destination directory
    SetDestination { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_all_conflicts_with_files() {
        let result = Cli::try_parse_from(["modsync", "install", "--all", "mapA.zip"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_auto_sync_without_subcommand() {
        let cli = Cli::try_parse_from(["modsync", "--auto-sync"]).unwrap();
        assert!(cli.auto_sync);
        assert!(cli.command.is_none());
    }
}
