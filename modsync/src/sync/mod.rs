//! Ties catalog, freshness, scheduler and installer into one engine.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::cache::{Cache, CacheStore};
use crate::catalog::CatalogProvider;
use crate::config::{default_data_dir, default_downloads_dir, ConfigFile};
use crate::error::{SyncError, SyncResult};
use crate::fetch::checksum::sha256_file;
use crate::fetch::freshness::{should_download, FreshnessOracle, Prober};
use crate::fetch::progress::{EventSink, SyncEvent};
use crate::fetch::queue::{QueueItem, QueueReport};
use crate::fetch::scheduler::{DownloadScheduler, DEFAULT_CONCURRENCY};
use crate::fetch::transport::Transport;
use crate::installer::{InstallReport, Installer};

/// Engine configuration, built with chained setters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    catalog_url: String,
    data_dir: PathBuf,
    downloads_dir: PathBuf,
    max_concurrency: usize,
}

impl EngineConfig {
    /// Configuration with platform-default directories.
    pub fn new(catalog_url: impl Into<String>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            data_dir: default_data_dir(),
            downloads_dir: default_downloads_dir(),
            max_concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = dir;
        self
    }

    pub fn with_downloads_dir(mut self, dir: PathBuf) -> Self {
        self.downloads_dir = dir;
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn downloads_dir(&self) -> &PathBuf {
        &self.downloads_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("cache.json")
    }
}

/// Result of a full sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Files the plan selected for transfer.
    pub planned: usize,
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn absorb(&mut self, queue: QueueReport) {
        self.downloaded.extend(queue.downloaded);
        self.skipped.extend(queue.skipped);
        self.failed.extend(queue.failed);
    }
}

/// One row of the `list` output: a cached archive and what the ledger
/// knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadListing {
    pub filename: String,
    pub size_bytes: u64,
    pub content_hash: Option<String>,
    pub downloaded_at: Option<chrono::DateTime<Utc>>,
}

/// The sync engine.
///
/// Generic over the catalog source so tests can drive it from canned
/// catalogs; transport and prober are injectable the same way.
pub struct SyncEngine<C: CatalogProvider> {
    catalog: C,
    config: EngineConfig,
    store: CacheStore,
    transport: Arc<Transport>,
    prober: Arc<dyn Prober>,
}

impl<C: CatalogProvider> SyncEngine<C> {
    pub fn new(catalog: C, config: EngineConfig) -> Self {
        // Probes and downloads both present the catalog page as the
        // referring document; the origin rejects anonymous requests.
        let prober: Arc<dyn Prober> =
            Arc::new(FreshnessOracle::new(Some(config.catalog_url.clone())));
        let store = CacheStore::new(config.cache_path());
        Self {
            catalog,
            config,
            store,
            transport: Arc::new(Transport::new()),
            prober,
        }
    }

    /// Swap the transport chain. Exposed for tests.
    pub fn with_transport(mut self, transport: Arc<Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Swap the freshness prober. Exposed for tests.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn scheduler(&self) -> DownloadScheduler {
        DownloadScheduler::new(
            self.transport.clone(),
            self.prober.clone(),
            self.config.downloads_dir.clone(),
            Some(self.config.catalog_url.clone()),
            self.config.max_concurrency,
        )
    }

    /// Fetch the catalog and decide what needs transferring.
    ///
    /// Missing local files are queued without probing; probing them
    /// buys nothing since the decision is already made. Existing files
    /// are probed sequentially and queued only when stale.
    fn plan(
        &self,
        cache: &mut Cache,
        report: &mut SyncReport,
        sink: &dyn EventSink,
    ) -> SyncResult<Vec<QueueItem>> {
        let entries = self.catalog.fetch()?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut queue = Vec::new();
        let mut to_download = Vec::new();
        let mut to_update = Vec::new();

        for entry in &entries {
            let local = self.config.downloads_dir.join(&entry.filename);
            if !local.exists() {
                to_download.push(entry.filename.clone());
                queue.push(QueueItem::new(&entry.filename, &entry.url, entry.approx_size));
                continue;
            }

            let probe = self.prober.probe(&entry.url);
            if should_download(
                &self.store,
                cache,
                &self.config.downloads_dir,
                &entry.filename,
                &entry.url,
                &probe,
            ) {
                to_update.push(entry.filename.clone());
                queue.push(QueueItem::new(
                    &entry.filename,
                    &entry.url,
                    probe.content_length.or(entry.approx_size),
                ));
            } else {
                sink.emit(SyncEvent::Skipped {
                    filename: entry.filename.clone(),
                    reason: "local copy is current".to_string(),
                });
                report.skipped.push(entry.filename.clone());
            }
        }

        let total_bytes = queue.iter().filter_map(|i| i.size_hint).sum();
        info!(
            new = to_download.len(),
            stale = to_update.len(),
            current = report.skipped.len(),
            "sync plan ready"
        );
        sink.emit(SyncEvent::Plan {
            to_download: to_download.len(),
            to_update: to_update.len(),
            total: queue.len(),
            total_bytes,
        });

        Ok(queue)
    }

    /// Run a full sync: plan, drain the queue, stamp `lastChecked`.
    ///
    /// A catalog failure is fatal and nothing is transferred; per-file
    /// failures are accumulated in the report.
    pub fn sync(&self, sink: &dyn EventSink) -> SyncResult<SyncReport> {
        let mut cache = self.store.load()?;
        let mut report = SyncReport::default();

        let queue = self.plan(&mut cache, &mut report, sink)?;
        if queue.is_empty() && report.skipped.is_empty() {
            sink.emit(SyncEvent::Info {
                message: "catalog is empty, nothing to sync".to_string(),
            });
        }
        report.planned = queue.len();

        if !queue.is_empty() {
            let queue_report = self
                .scheduler()
                .run(&queue, &self.store, &mut cache, false, sink)?;
            report.absorb(queue_report);
        }

        self.stamp_last_checked();
        Ok(report)
    }

    /// Install the named cached files into the destination directory.
    pub fn install(&self, filenames: &[String]) -> SyncResult<InstallReport> {
        let config = ConfigFile::load(&self.config.config_path())?;
        let installer = Installer::new(
            self.config.downloads_dir.clone(),
            config.destination_path,
        );
        Ok(installer.install(filenames))
    }

    /// Install every archive currently in the download cache.
    pub fn install_all(&self) -> SyncResult<InstallReport> {
        let filenames = self
            .list_downloads()?
            .into_iter()
            .map(|l| l.filename)
            .collect::<Vec<_>>();
        self.install(&filenames)
    }

    /// Force-redownload the named files and install them.
    ///
    /// Evicts each ledger entry first and fetches from the evicted
    /// entry's source URL with the freshness heuristic bypassed; a file
    /// the ledger does not track is reported as failed, not fatal.
    pub fn reinstall(&self, filenames: &[String], sink: &dyn EventSink) -> SyncResult<SyncReport> {
        let mut cache = self.store.load()?;
        let mut report = SyncReport::default();
        let mut queue = Vec::new();

        for filename in filenames {
            match cache.evict(filename) {
                Some(entry) => {
                    queue.push(QueueItem::new(filename, &entry.source_url, entry.size_bytes));
                }
                None => {
                    let err = SyncError::NotTracked {
                        filename: filename.clone(),
                    };
                    sink.emit(SyncEvent::Error {
                        filename: filename.clone(),
                        message: err.to_string(),
                    });
                    report.failed.push((filename.clone(), err.to_string()));
                }
            }
        }
        self.store.save_best_effort(&cache);
        report.planned = queue.len();

        if !queue.is_empty() {
            let queue_report = self
                .scheduler()
                .run(&queue, &self.store, &mut cache, true, sink)?;
            report.absorb(queue_report);
        }

        // A reinstall replaces the destination copy unconditionally;
        // the identical-file skip would defeat the point.
        let config = ConfigFile::load(&self.config.config_path())?;
        let installer = Installer::new(
            self.config.downloads_dir.clone(),
            config.destination_path,
        );
        let install = installer.force_install(&report.downloaded);
        for (filename, reason) in install.failed {
            report.failed.push((filename, reason));
        }
        Ok(report)
    }

    /// List cached archives with their ledger metadata.
    ///
    /// Hashes missing from the ledger are computed here and persisted,
    /// so the listing doubles as a backfill pass.
    pub fn list_downloads(&self) -> SyncResult<Vec<DownloadListing>> {
        let dir = &self.config.downloads_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut cache = self.store.load()?;
        let mut backfilled = false;
        let mut listings = Vec::new();

        let mut names: Vec<(String, PathBuf)> = Vec::new();
        let read_dir = fs::read_dir(dir).map_err(|e| SyncError::ReadFailed {
            path: dir.clone(),
            source: e,
        })?;
        for entry in read_dir {
            let entry = entry.map_err(|e| SyncError::ReadFailed {
                path: dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            let is_archive = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("zip") || e.eq_ignore_ascii_case("zipx"))
                .unwrap_or(false);
            if path.is_file() && is_archive {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push((name.to_string(), path.clone()));
                }
            }
        }
        names.sort();

        for (filename, path) in names {
            let size_bytes = path
                .metadata()
                .map_err(|e| SyncError::ReadFailed {
                    path: path.clone(),
                    source: e,
                })?
                .len();

            let known = cache.get(&filename).cloned();
            let content_hash = match known.as_ref().and_then(|e| e.content_hash.clone()) {
                Some(hash) => Some(hash),
                None => match sha256_file(&path) {
                    Ok(hash) => {
                        if let Some(entry) = cache.mods.get_mut(&filename) {
                            entry.content_hash = Some(hash.clone());
                            entry.size_bytes = Some(size_bytes);
                            backfilled = true;
                        }
                        Some(hash)
                    }
                    Err(e) => {
                        warn!(file = %filename, error = %e, "failed to hash cached file");
                        None
                    }
                },
            };

            listings.push(DownloadListing {
                filename,
                size_bytes,
                content_hash,
                downloaded_at: known.and_then(|e| e.downloaded_at),
            });
        }

        if backfilled {
            self.store.save_best_effort(&cache);
        }
        Ok(listings)
    }

    /// Record the time of a completed sync in the config document.
    fn stamp_last_checked(&self) {
        let path = self.config.config_path();
        match ConfigFile::load(&path) {
            Ok(mut config) => {
                config.last_checked = Some(Utc::now());
                if let Err(e) = config.save(&path) {
                    warn!(error = %e, "failed to record lastChecked");
                }
            }
            Err(e) => warn!(error = %e, "failed to load config for lastChecked"),
        }
    }
}
