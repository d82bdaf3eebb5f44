//! Staleness decisions under unreliable remote metadata.
//!
//! The origin server does not reliably expose strong validators, so the
//! decision is a size heuristic: a file is considered stale only when a
//! trusted-enough probe length differs from the on-disk size by more
//! than [`SIZE_TOLERANCE`] bytes. ETag and Last-Modified are captured
//! for the ledger but never compared. The heuristic accepts possible
//! false negatives (a stale file kept) in exchange for not
//! re-downloading large archives on every check.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheEntry, CacheStore};
use crate::fetch::checksum::sha256_file;
use crate::fetch::client::{build_client, USER_AGENT};

/// Slack absorbing container-overhead and framing differences for what
/// is semantically the same artifact. Exact equality would cause
/// spurious re-downloads.
pub const SIZE_TOLERANCE: u64 = 2048;

/// Probe lengths below this are treated as broken placeholder responses
/// (error pages, misconfigured servers) and never trigger a download.
pub const MIN_VALID_LENGTH: u64 = 1024;

/// Timeout for metadata probes. Kept short: a probe that stalls should
/// degrade to "no metadata", not hold up planning.
const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Metadata gathered by a lightweight probe of a remote file.
///
/// All fields are optional; an entirely empty probe is a normal,
/// expected outcome against unreliable servers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreshnessProbe {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_length: Option<u64>,
}

/// Source of freshness probes.
///
/// Trait seam so the scheduler can be exercised in tests without a
/// network.
pub trait Prober: Send + Sync {
    /// Probe a URL for metadata. Never fails: absence of metadata is
    /// reported as an empty probe.
    fn probe(&self, url: &str) -> FreshnessProbe;
}

/// HTTP-backed prober: HEAD first, then a one-byte range request.
pub struct FreshnessOracle {
    client: Client,
    referer: Option<String>,
}

impl FreshnessOracle {
    /// Create an oracle. `referer` is sent with every probe when set
    /// (the origin server requires it).
    pub fn new(referer: Option<String>) -> Self {
        Self {
            client: build_client(PROBE_TIMEOUT),
            referer,
        }
    }

    fn request(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        let builder = builder
            .header("User-Agent", USER_AGENT)
            .header("Accept", "*/*")
            .header("Accept-Encoding", "identity");
        match &self.referer {
            Some(referer) => builder.header("Referer", referer),
            None => builder,
        }
    }

    /// Metadata-only request.
    fn try_head(&self, url: &str) -> Result<FreshnessProbe, String> {
        let response = self
            .request(self.client.head(url))
            .send()
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HEAD returned {}", response.status()));
        }

        Ok(probe_from_headers(response.headers(), None))
    }

    /// Minimal-range request: fetch byte 0 only and read the total size
    /// from the `Content-Range` suffix.
    fn try_range(&self, url: &str) -> Result<FreshnessProbe, String> {
        let response = self
            .request(self.client.get(url))
            .header("Range", "bytes=0-0")
            .send()
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("range GET returned {}", response.status()));
        }

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        Ok(probe_from_headers(response.headers(), total))
    }
}

impl Prober for FreshnessOracle {
    fn probe(&self, url: &str) -> FreshnessProbe {
        let head = match self.try_head(url) {
            Ok(probe) if probe.content_length.is_some() => return probe,
            Ok(probe) => Some(probe),
            Err(reason) => {
                debug!(url, reason, "HEAD probe failed");
                None
            }
        };

        match self.try_range(url) {
            Ok(mut probe) => {
                // Keep validators from the HEAD response when the range
                // response omitted them.
                if let Some(head) = head {
                    probe.etag = probe.etag.or(head.etag);
                    probe.last_modified = probe.last_modified.or(head.last_modified);
                }
                probe
            }
            Err(reason) => {
                debug!(url, reason, "range probe failed; treating as no metadata");
                head.unwrap_or_default()
            }
        }
    }
}

fn probe_from_headers(
    headers: &reqwest::header::HeaderMap,
    total_override: Option<u64>,
) -> FreshnessProbe {
    let header_str =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

    let content_length = total_override.or_else(|| {
        headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    });

    FreshnessProbe {
        etag: header_str("etag"),
        last_modified: header_str("last-modified"),
        content_length,
    }
}

/// Parse the total-size suffix of a `Content-Range` value
/// (`bytes 0-0/12345` -> 12345).
fn parse_content_range_total(value: &str) -> Option<u64> {
    let re = Regex::new(r"/(\d+)\s*$").expect("content-range regex");
    re.captures(value)?.get(1)?.as_str().parse().ok()
}

/// Whether a probe length proves the local copy stale.
///
/// Absent or sub-[`MIN_VALID_LENGTH`] lengths are no signal; otherwise
/// the difference against the on-disk size must exceed
/// [`SIZE_TOLERANCE`].
fn stale_by_length(local_size: u64, probe_length: Option<u64>) -> bool {
    match probe_length {
        None => false,
        Some(len) if len < MIN_VALID_LENGTH => false,
        Some(len) => len.abs_diff(local_size) > SIZE_TOLERANCE,
    }
}

/// Decide whether `filename` needs (re)downloading.
///
/// Evaluated in order:
/// 1. no local file -> download;
/// 2. local file without a ledger entry -> seed an entry from the file,
///    then apply the size rule;
/// 3. local file with an entry -> lazily backfill a missing hash, then
///    apply the size rule against the *current* on-disk size.
///
/// Seeding and backfill persist best-effort: a failed ledger write is
/// logged and never changes the decision.
pub fn should_download(
    store: &CacheStore,
    cache: &mut Cache,
    downloads_dir: &Path,
    filename: &str,
    url: &str,
    probe: &FreshnessProbe,
) -> bool {
    let local_path = downloads_dir.join(filename);
    if !local_path.exists() {
        info!(file = filename, "no local file, downloading");
        return true;
    }

    let local_size = match local_path.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(file = filename, error = %e, "cannot stat local file, downloading");
            return true;
        }
    };

    if cache.get(filename).is_none() {
        // Seed the ledger from the untracked file.
        match sha256_file(&local_path) {
            Ok(hash) => {
                cache.insert(
                    filename,
                    CacheEntry {
                        source_url: url.to_string(),
                        content_hash: Some(hash),
                        size_bytes: Some(local_size),
                        etag: probe.etag.clone(),
                        last_modified: None,
                        downloaded_at: Some(Utc::now()),
                    },
                );
                store.save_best_effort(cache);
                info!(file = filename, size = local_size, "seeded ledger entry from existing file");
            }
            Err(e) => {
                warn!(file = filename, error = %e, "failed to hash existing file while seeding");
            }
        }
    } else {
        // Backfill a hash recorded before hashing existed.
        let needs_hash = cache
            .get(filename)
            .map(|entry| entry.content_hash.is_none())
            .unwrap_or(false);
        if needs_hash {
            match sha256_file(&local_path) {
                Ok(hash) => {
                    if let Some(entry) = cache.mods.get_mut(filename) {
                        entry.content_hash = Some(hash);
                        entry.size_bytes = Some(local_size);
                    }
                    store.save_best_effort(cache);
                }
                Err(e) => {
                    warn!(file = filename, error = %e, "failed to backfill content hash");
                }
            }
        }
    }

    let download = stale_by_length(local_size, probe.content_length);
    info!(
        file = filename,
        local_size,
        probe_len = ?probe.content_length,
        tolerance = SIZE_TOLERANCE,
        download,
        "freshness decision"
    );
    download
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, CacheStore, Cache) {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache.json"));
        (temp, store, Cache::default())
    }

    fn probe_len(len: u64) -> FreshnessProbe {
        FreshnessProbe {
            content_length: Some(len),
            ..Default::default()
        }
    }

    #[test]
    fn test_stale_by_length_no_signal_skips() {
        assert!(!stale_by_length(1_000_000, None));
    }

    #[test]
    fn test_stale_by_length_tiny_probe_skips() {
        // A 500-byte report for a 50MB file is a broken response.
        assert!(!stale_by_length(50_000_000, Some(500)));
        assert!(!stale_by_length(50_000_000, Some(1023)));
    }

    #[test]
    fn test_stale_by_length_tolerance_boundary() {
        assert!(!stale_by_length(100_000_000, Some(100_001_000)));
        assert!(!stale_by_length(100_000, Some(100_000 + SIZE_TOLERANCE)));
        assert!(stale_by_length(100_000, Some(100_000 + SIZE_TOLERANCE + 1)));
        assert!(stale_by_length(100_000 + SIZE_TOLERANCE + 1, Some(100_000)));
    }

    #[test]
    fn test_missing_file_always_downloads() {
        let (temp, store, mut cache) = fixture();

        let download = should_download(
            &store,
            &mut cache,
            temp.path(),
            "mapA.zip",
            "http://example.com/mapA.zip",
            &FreshnessProbe::default(),
        );

        assert!(download);
        assert!(cache.is_empty(), "missing file must not be seeded");
    }

    #[test]
    fn test_untracked_file_is_seeded_with_matching_hash() {
        let (temp, store, mut cache) = fixture();
        fs::write(temp.path().join("mapA.zip"), b"hello world").unwrap();

        let download = should_download(
            &store,
            &mut cache,
            temp.path(),
            "mapA.zip",
            "http://example.com/mapA.zip",
            &FreshnessProbe::default(),
        );

        assert!(!download, "no probe signal means assume current");
        let entry = cache.get("mapA.zip").unwrap();
        assert_eq!(
            entry.content_hash.as_deref(),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
        assert_eq!(entry.size_bytes, Some(11));
        assert_eq!(entry.source_url, "http://example.com/mapA.zip");

        // Seeding is persisted.
        let persisted = store.load().unwrap();
        assert!(persisted.get("mapA.zip").is_some());
    }

    #[test]
    fn test_seeded_file_with_divergent_probe_downloads() {
        let (temp, store, mut cache) = fixture();
        fs::write(temp.path().join("mapA.zip"), vec![0u8; 10_000]).unwrap();

        let download = should_download(
            &store,
            &mut cache,
            temp.path(),
            "mapA.zip",
            "http://example.com/mapA.zip",
            &probe_len(20_000),
        );

        assert!(download);
    }

    #[test]
    fn test_tracked_file_within_tolerance_skips() {
        let (temp, store, mut cache) = fixture();
        fs::write(temp.path().join("mapA.zip"), vec![0u8; 10_000]).unwrap();
        cache.insert(
            "mapA.zip",
            CacheEntry::downloaded("http://example.com/mapA.zip", "abc", 10_000),
        );

        let download = should_download(
            &store,
            &mut cache,
            temp.path(),
            "mapA.zip",
            "http://example.com/mapA.zip",
            &probe_len(10_000 + 1000),
        );

        assert!(!download);
    }

    #[test]
    fn test_tracked_file_tiny_probe_skips() {
        let (temp, store, mut cache) = fixture();
        fs::write(temp.path().join("mapA.zip"), vec![0u8; 50_000]).unwrap();
        cache.insert(
            "mapA.zip",
            CacheEntry::downloaded("http://example.com/mapA.zip", "abc", 50_000),
        );

        let download = should_download(
            &store,
            &mut cache,
            temp.path(),
            "mapA.zip",
            "http://example.com/mapA.zip",
            &probe_len(500),
        );

        assert!(!download);
    }

    #[test]
    fn test_tracked_entry_backfills_missing_hash() {
        let (temp, store, mut cache) = fixture();
        fs::write(temp.path().join("mapA.zip"), b"hello world").unwrap();
        cache.insert(
            "mapA.zip",
            CacheEntry {
                source_url: "http://example.com/mapA.zip".to_string(),
                content_hash: None,
                size_bytes: None,
                etag: None,
                last_modified: None,
                downloaded_at: None,
            },
        );

        should_download(
            &store,
            &mut cache,
            temp.path(),
            "mapA.zip",
            "http://example.com/mapA.zip",
            &FreshnessProbe::default(),
        );

        let entry = cache.get("mapA.zip").unwrap();
        assert!(entry.content_hash.is_some());
        assert_eq!(entry.size_bytes, Some(11));
    }

    #[test]
    fn test_decision_uses_on_disk_size_not_ledger_size() {
        let (temp, store, mut cache) = fixture();
        // Ledger claims a very different size than what is on disk.
        fs::write(temp.path().join("mapA.zip"), vec![0u8; 10_000]).unwrap();
        cache.insert(
            "mapA.zip",
            CacheEntry::downloaded("http://example.com/mapA.zip", "abc", 999_999),
        );

        let download = should_download(
            &store,
            &mut cache,
            temp.path(),
            "mapA.zip",
            "http://example.com/mapA.zip",
            &probe_len(10_500),
        );

        assert!(!download, "10500 is within tolerance of the on-disk 10000");
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/12345"), Some(12345));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
