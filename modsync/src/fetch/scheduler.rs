//! Drains a download queue with bounded concurrency.
//!
//! Each item is re-probed just before transfer, fetched to a `.partial`
//! sibling, hashed, and only then moved to its final name, so an
//! interrupted transfer can never be mistaken for a complete file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use crate::cache::{Cache, CacheEntry, CacheStore};
use crate::error::SyncResult;
use crate::fetch::checksum::sha256_file;
use crate::fetch::freshness::{should_download, FreshnessProbe, Prober};
use crate::fetch::progress::{AggregateCounters, EventSink, SyncEvent};
use crate::fetch::queue::{ItemOutcome, QueueItem, QueueReport};
use crate::fetch::transport::{FetchOptions, Transport};

/// Default number of files in flight at once. One: the origin throttles
/// per-connection and concurrent transfers starve each other.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Outcome of the per-item freshness check at the moment of its turn.
enum Admission {
    Skip(ItemOutcome),
    Fetch(FreshnessProbe),
}

pub struct DownloadScheduler {
    transport: Arc<Transport>,
    prober: Arc<dyn Prober>,
    downloads_dir: PathBuf,
    referer: Option<String>,
    max_concurrency: usize,
}

impl DownloadScheduler {
    pub fn new(
        transport: Arc<Transport>,
        prober: Arc<dyn Prober>,
        downloads_dir: PathBuf,
        referer: Option<String>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            transport,
            prober,
            downloads_dir,
            referer,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Drain `items`, updating the ledger as files land.
    ///
    /// With `force` set, the freshness check is bypassed and every item
    /// is fetched unconditionally (reinstall path). Per-item failures
    /// are emitted as events and collected; they never abort the rest
    /// of the queue.
    pub fn run(
        &self,
        items: &[QueueItem],
        store: &CacheStore,
        cache: &mut Cache,
        force: bool,
        sink: &dyn EventSink,
    ) -> SyncResult<QueueReport> {
        let mut report = QueueReport::default();
        if items.is_empty() {
            return Ok(report);
        }

        fs::create_dir_all(&self.downloads_dir).map_err(|e| {
            crate::error::SyncError::CreateDirFailed {
                path: self.downloads_dir.clone(),
                source: e,
            }
        })?;

        let total_bytes: u64 = items.iter().filter_map(|i| i.size_hint).sum();
        let counters = AggregateCounters::new(total_bytes, items.len());

        if self.max_concurrency == 1 {
            for (index, item) in items.iter().enumerate() {
                match self.admit(item, index, store, cache, force, &counters, sink) {
                    Admission::Skip(outcome) => report.record(&item.filename, &outcome),
                    Admission::Fetch(probe) => {
                        let outcome = self.fetch_one(item, &probe, index, &counters, sink);
                        self.settle(item, &probe, &outcome, store, cache, sink);
                        report.record(&item.filename, &outcome);
                    }
                }
            }
        } else {
            let mut start = 0;
            while start < items.len() {
                let end = (start + self.max_concurrency).min(items.len());

                // Admission probes and mutates the ledger, so it runs
                // here just before the batch spawns. Workers only move
                // bytes.
                let mut jobs: Vec<(usize, &QueueItem, FreshnessProbe)> = Vec::new();
                for (index, item) in items[start..end].iter().enumerate() {
                    let index = start + index;
                    match self.admit(item, index, store, cache, force, &counters, sink) {
                        Admission::Skip(outcome) => report.record(&item.filename, &outcome),
                        Admission::Fetch(probe) => jobs.push((index, item, probe)),
                    }
                }

                let mut settled: Vec<(&QueueItem, &FreshnessProbe, ItemOutcome)> = Vec::new();
                thread::scope(|scope| {
                    let mut handles = Vec::new();
                    for &(index, item, ref probe) in &jobs {
                        let counters = &counters;
                        let handle =
                            scope.spawn(move || self.fetch_one(item, probe, index, counters, sink));
                        handles.push((item, probe, handle));
                    }
                    for (item, probe, handle) in handles {
                        let outcome = match handle.join() {
                            Ok(outcome) => outcome,
                            Err(_) => ItemOutcome::Failed {
                                message: "download worker panicked".to_string(),
                            },
                        };
                        settled.push((item, probe, outcome));
                    }
                });
                // Ledger writes happen after the batch joins.
                for (item, probe, outcome) in settled {
                    self.settle(item, probe, &outcome, store, cache, sink);
                    report.record(&item.filename, &outcome);
                }

                start = end;
            }
        }

        Ok(report)
    }

    /// Decide one item's fate at the moment of its turn: probe the
    /// origin, emit the start event, and re-check freshness. Mutates
    /// the ledger; main thread only.
    fn admit(
        &self,
        item: &QueueItem,
        index: usize,
        store: &CacheStore,
        cache: &mut Cache,
        force: bool,
        counters: &AggregateCounters,
        sink: &dyn EventSink,
    ) -> Admission {
        let probe = self.prober.probe(&item.url);
        let planned = probe.content_length.or(item.size_hint);

        sink.emit(SyncEvent::Download {
            filename: item.filename.clone(),
            transferred: 0,
            total: planned,
            aggregate: counters.snapshot(index + 1),
        });

        if !force
            && !should_download(
                store,
                cache,
                &self.downloads_dir,
                &item.filename,
                &item.url,
                &probe,
            )
        {
            sink.emit(SyncEvent::Skipped {
                filename: item.filename.clone(),
                reason: "local copy is current".to_string(),
            });
            // Retire only what the item contributed to the planned
            // total, so skips keep the aggregate consistent.
            counters.complete_file(index, item.size_hint.unwrap_or(0));
            return Admission::Skip(ItemOutcome::Skipped {
                reason: "local copy is current".to_string(),
            });
        }

        Admission::Fetch(probe)
    }

    /// Transfer one file to disk. No ledger access; safe on a worker.
    fn fetch_one(
        &self,
        item: &QueueItem,
        probe: &FreshnessProbe,
        index: usize,
        counters: &AggregateCounters,
        sink: &dyn EventSink,
    ) -> ItemOutcome {
        let final_path = self.downloads_dir.join(&item.filename);
        let partial_path = self.downloads_dir.join(format!("{}.partial", item.filename));
        let planned = probe.content_length.or(item.size_hint);

        let opts = FetchOptions {
            referer: self.referer.clone(),
            size_hint: planned,
        };

        let result = self.transport.fetch(
            &item.url,
            &partial_path,
            &opts,
            &|transferred, total| {
                counters.set_inflight(index, transferred);
                sink.emit(SyncEvent::Download {
                    filename: item.filename.clone(),
                    transferred,
                    total: total.or(planned),
                    aggregate: counters.snapshot(index + 1),
                });
            },
        );

        counters.complete_file(index, planned.unwrap_or(0));

        match result {
            Ok(size) => {
                if let Err(e) = fs::rename(&partial_path, &final_path) {
                    remove_quietly(&partial_path);
                    let message = format!("failed to move completed file into place: {e}");
                    error!(file = item.filename, error = %e, "rename failed");
                    sink.emit(SyncEvent::Error {
                        filename: item.filename.clone(),
                        message: message.clone(),
                    });
                    return ItemOutcome::Failed { message };
                }
                info!(file = item.filename, size, "download complete");
                ItemOutcome::Downloaded { bytes: size }
            }
            Err(e) => {
                remove_quietly(&partial_path);
                let message = e.to_string();
                error!(file = item.filename, error = %e, "download failed");
                sink.emit(SyncEvent::Error {
                    filename: item.filename.clone(),
                    message: message.clone(),
                });
                ItemOutcome::Failed { message }
            }
        }
    }

    /// Record a finished item in the ledger. Main thread only.
    fn settle(
        &self,
        item: &QueueItem,
        probe: &FreshnessProbe,
        outcome: &ItemOutcome,
        store: &CacheStore,
        cache: &mut Cache,
        sink: &dyn EventSink,
    ) {
        let ItemOutcome::Downloaded { bytes } = outcome else {
            return;
        };

        let final_path = self.downloads_dir.join(&item.filename);
        match sha256_file(&final_path) {
            Ok(hash) => {
                cache.insert(
                    &item.filename,
                    CacheEntry::downloaded(&item.url, hash, *bytes)
                        .with_validators(probe.etag.clone(), probe.last_modified.clone()),
                );
                store.save_best_effort(cache);
            }
            Err(e) => {
                // The bytes are on disk; a missing hash only means the
                // next freshness pass backfills it.
                warn!(file = item.filename, error = %e, "failed to hash downloaded file");
                sink.emit(SyncEvent::Info {
                    message: format!("downloaded {} but could not hash it: {e}", item.filename),
                });
            }
        }
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove partial file");
        }
    }
}
