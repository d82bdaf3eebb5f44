//! Download pipeline: freshness probing, transports and scheduling.
//!
//! The pipeline is organized around small trait seams. [`Prober`]
//! answers "how big is the remote file", [`FetchStrategy`] moves bytes,
//! and [`EventSink`] receives lifecycle events; the
//! [`DownloadScheduler`] composes them over a queue.

pub mod checksum;
pub mod client;
pub mod freshness;
pub mod progress;
pub mod queue;
pub mod scheduler;
pub mod transport;

pub use checksum::sha256_file;
pub use freshness::{
    should_download, FreshnessOracle, FreshnessProbe, Prober, MIN_VALID_LENGTH, SIZE_TOLERANCE,
};
pub use progress::{AggregateProgress, EventSink, NullSink, SyncEvent};
pub use queue::{ItemOutcome, QueueItem, QueueReport};
pub use scheduler::{DownloadScheduler, DEFAULT_CONCURRENCY};
pub use transport::{CurlFetch, FetchOptions, FetchStrategy, StreamingFetch, Transport};
