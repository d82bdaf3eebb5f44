//! Remote catalog of downloadable archives.
//!
//! The sync engine consumes the catalog through the [`CatalogProvider`]
//! trait; any implementation that can produce a list of
//! `{filename, url, approximate size}` entries works. The bundled
//! [`HtmlCatalogProvider`] scrapes an HTML listing page.

mod html;

pub use html::HtmlCatalogProvider;

use crate::error::SyncResult;

/// One downloadable archive advertised by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Unique key, derived from the URL's last path segment.
    pub filename: String,

    /// Absolute download URL.
    pub url: String,

    /// Best-effort size parsed from human-readable text.
    ///
    /// Untrustworthy; used only as a progress-bar hint, never for
    /// correctness decisions.
    pub approx_size: Option<u64>,
}

/// Source of catalog entries.
///
/// A failed fetch is fatal to the whole sync attempt: no download queue
/// is built on a catalog error.
pub trait CatalogProvider: Send + Sync {
    /// Fetch the current catalog.
    fn fetch(&self) -> SyncResult<Vec<CatalogEntry>>;
}
