//! modsync - keep a local mod collection synchronized with a remote
//! catalog and install it into the game's mods directory.
//!
//! The library is organized as a pipeline:
//!
//! - [`catalog`] discovers downloadable archives on the remote page.
//! - [`fetch`] decides freshness, moves bytes with transport fallback,
//!   and reports progress events.
//! - [`cache`] tracks what was downloaded, where from, and its hash.
//! - [`installer`] copies verified archives into the destination.
//! - [`sync`] composes the above into `sync`, `install`, `reinstall`
//!   and `list` operations.
//!
//! Everything is blocking I/O; concurrency beyond one download at a
//! time uses plain worker threads bounded by configuration.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod installer;
pub mod logging;
pub mod sync;

pub use cache::{Cache, CacheEntry, CacheStore};
pub use catalog::{CatalogEntry, CatalogProvider, HtmlCatalogProvider};
pub use config::ConfigFile;
pub use error::{SyncError, SyncResult};
pub use fetch::{EventSink, NullSink, SyncEvent};
pub use installer::{InstallReport, Installer};
pub use sync::{DownloadListing, EngineConfig, SyncEngine, SyncReport};
