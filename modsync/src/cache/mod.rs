//! Content-addressed cache ledger for downloaded archives.
//!
//! The ledger is a single JSON document mapping filenames to
//! [`CacheEntry`] provenance records. It is the sole durable source of
//! truth about what has been downloaded; in-memory copies are transient
//! and are re-persisted after every mutation. The design assumes a
//! single process instance per ledger (load-then-save is last-writer-wins
//! across processes).

mod entry;
mod store;

pub use entry::CacheEntry;
pub use store::{Cache, CacheStore};
