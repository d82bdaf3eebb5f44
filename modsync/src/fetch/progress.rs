//! Progress and lifecycle events emitted by the sync pipeline.
//!
//! Events carry both per-file byte counts and an aggregate view over
//! the whole queue, so a renderer can draw one file bar and one overall
//! bar from a single stream.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Aggregate byte progress over an entire download queue.
///
/// `transferred` only moves forward: on file completion it advances by
/// the larger of the bytes actually moved and the planned size, so a
/// wrong size estimate can never make the overall bar run backwards.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateProgress {
    /// Bytes accounted for so far across all files.
    pub transferred: u64,
    /// Planned total bytes for the queue (estimates included).
    pub total: u64,
    /// `total - transferred`, saturating.
    pub remaining: u64,
    /// 1-based index of the file currently in flight.
    pub file_index: usize,
    /// Number of files in the queue.
    pub num_files: usize,
}

/// One event in the lifecycle of a sync run.
///
/// Serialized with a lowercase `type` discriminant and camelCase fields
/// so the stream can be consumed by the same frontends as the original
/// launcher's IPC messages.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SyncEvent {
    /// The queue has been decided.
    ///
    /// Counts match the original launcher's plan message
    /// (`{toDownload, toUpdate, total}`); `totalBytes` is an additional
    /// field carrying the planned byte volume for progress rendering.
    Plan {
        /// Number of new files with no local copy.
        to_download: usize,
        /// Number of existing files judged stale.
        to_update: usize,
        /// Total files queued for transfer.
        total: usize,
        total_bytes: u64,
    },
    /// Byte progress for the file currently downloading.
    Download {
        filename: String,
        transferred: u64,
        /// Best known size for this file; absent when neither the probe
        /// nor the response reported one.
        total: Option<u64>,
        aggregate: AggregateProgress,
    },
    /// A file was left untouched (fresh, or no usable signal).
    Skipped { filename: String, reason: String },
    /// A single file failed; the run continues.
    Error { filename: String, message: String },
    /// Free-form status line (empty catalog, run summary).
    Info { message: String },
}

/// Consumer of [`SyncEvent`]s.
///
/// Implemented for any `Fn(SyncEvent)` so callers can pass a closure.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

impl<F> EventSink for F
where
    F: Fn(SyncEvent) + Send + Sync,
{
    fn emit(&self, event: SyncEvent) {
        self(event)
    }
}

/// Sink that drops every event, for headless callers.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SyncEvent) {}
}

/// Shared counters backing [`AggregateProgress`] snapshots.
///
/// Each queue item owns one in-flight cell, so concurrent workers
/// never overwrite each other's byte counts; a snapshot sums the cells
/// plus the completed total. A finished item is folded into
/// `completed_bytes` before its cell is cleared, so a snapshot taken
/// at any interleaving never observes the aggregate moving backwards.
pub struct AggregateCounters {
    completed_bytes: AtomicU64,
    inflight: Vec<AtomicU64>,
    total_bytes: u64,
}

impl AggregateCounters {
    pub fn new(total_bytes: u64, num_files: usize) -> Self {
        Self {
            completed_bytes: AtomicU64::new(0),
            inflight: (0..num_files).map(|_| AtomicU64::new(0)).collect(),
            total_bytes,
        }
    }

    /// Record live progress for the item at `index` (queue position).
    pub fn set_inflight(&self, index: usize, bytes: u64) {
        self.inflight[index].store(bytes, Ordering::Relaxed);
    }

    /// Fold the finished item at `index` into the completed total.
    ///
    /// Advances by the larger of the bytes actually transferred and the
    /// planned size, keeping the aggregate monotonic when estimates
    /// were wrong in either direction.
    pub fn complete_file(&self, index: usize, planned: u64) {
        let transferred = self.inflight[index].load(Ordering::Relaxed);
        self.completed_bytes
            .fetch_add(transferred.max(planned), Ordering::Relaxed);
        self.inflight[index].store(0, Ordering::Relaxed);
    }

    /// Snapshot for attaching to an event.
    pub fn snapshot(&self, file_index: usize) -> AggregateProgress {
        let inflight: u64 = self
            .inflight
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .sum();
        let transferred = self.completed_bytes.load(Ordering::Relaxed) + inflight;
        AggregateProgress {
            transferred,
            total: self.total_bytes,
            remaining: self.total_bytes.saturating_sub(transferred),
            file_index,
            num_files: self.inflight.len(),
        }
    }
}
