//! Byte transports for fetching remote archives.
//!
//! Two strategies, tried in order: a streaming HTTP client, then a
//! `curl` subprocess. The origin server intermittently resets long
//! streaming transfers in ways the HTTP client surfaces as hard errors,
//! while curl's own retry loop rides them out, so the subprocess stays
//! as a fallback instead of a curiosity.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::fetch::client::{build_client, DEFAULT_TIMEOUT, USER_AGENT};

const CHUNK_SIZE: usize = 64 * 1024;

/// Callback invoked as bytes land: `(transferred_so_far, total)`.
pub type ByteProgress<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Per-request options shared by all strategies.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Referer header, when the origin requires one.
    pub referer: Option<String>,
    /// Planned size from probing; used when the response itself does
    /// not report a length.
    pub size_hint: Option<u64>,
}

/// One way of moving a remote file onto disk.
///
/// Strategies write to `dest` (a temporary path owned by the caller)
/// and report progress as bytes arrive. On failure the caller removes
/// any partial output before trying the next strategy.
pub trait FetchStrategy: Send + Sync {
    /// Short name for logs and error messages.
    fn name(&self) -> &'static str;

    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        opts: &FetchOptions,
        on_bytes: ByteProgress,
    ) -> SyncResult<u64>;
}

/// Primary strategy: streaming GET through the shared HTTP client.
pub struct StreamingFetch {
    client: Client,
}

impl StreamingFetch {
    pub fn new() -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
        }
    }
}

impl Default for StreamingFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchStrategy for StreamingFetch {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        opts: &FetchOptions,
        on_bytes: ByteProgress,
    ) -> SyncResult<u64> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "*/*")
            .header("Accept-Encoding", "identity");
        if let Some(referer) = &opts.referer {
            request = request.header("Referer", referer);
        }

        let mut response = request.send().map_err(|e| SyncError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        validate_binary_response(url, response.status(), response.headers())?;

        // The wire length wins over the planning estimate.
        let total = response.content_length().or(opts.size_hint);

        let mut file = File::create(dest).map_err(|e| SyncError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        let mut transferred: u64 = 0;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|e| SyncError::Transport {
                    url: url.to_string(),
                    reason: format!("stream read failed: {e}"),
                })?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .map_err(|e| SyncError::WriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
            transferred += read as u64;
            on_bytes(transferred, total);
        }

        file.flush().map_err(|e| SyncError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        debug!(url, transferred, "streaming fetch complete");
        Ok(transferred)
    }
}

/// Reject responses that cannot be the requested archive: non-success
/// statuses, and markup behind a 200, which is an error page rather
/// than the file.
fn validate_binary_response(url: &str, status: StatusCode, headers: &HeaderMap) -> SyncResult<()> {
    if !status.is_success() {
        return Err(SyncError::Transport {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if content_type.to_ascii_lowercase().contains("text/html") {
        return Err(SyncError::UnexpectedContentType {
            url: url.to_string(),
            content_type,
        });
    }

    Ok(())
}

/// Fallback strategy: shell out to curl with its built-in retry loop.
pub struct CurlFetch;

impl CurlFetch {
    fn binary() -> &'static str {
        if cfg!(windows) {
            "curl.exe"
        } else {
            "curl"
        }
    }

    /// Argument list for one invocation. Split out so the flag set is
    /// testable without running a subprocess.
    fn curl_args(url: &str, dest: &Path, opts: &FetchOptions) -> Vec<String> {
        let mut args = vec![
            "-L".to_string(),
            "--retry".to_string(),
            "3".to_string(),
            "--fail".to_string(),
            "--silent".to_string(),
            "--show-error".to_string(),
            "-A".to_string(),
            USER_AGENT.to_string(),
        ];
        if let Some(referer) = &opts.referer {
            args.push("-e".to_string());
            args.push(referer.clone());
        }
        args.push("-o".to_string());
        args.push(dest.to_string_lossy().into_owned());
        args.push(url.to_string());
        args
    }
}

impl FetchStrategy for CurlFetch {
    fn name(&self) -> &'static str {
        "curl"
    }

    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        opts: &FetchOptions,
        on_bytes: ByteProgress,
    ) -> SyncResult<u64> {
        let output = Command::new(Self::binary())
            .args(Self::curl_args(url, dest, opts))
            .output()
            .map_err(|e| SyncError::Transport {
                url: url.to_string(),
                reason: format!("failed to launch curl: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::Transport {
                url: url.to_string(),
                reason: format!("curl exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let size = dest
            .metadata()
            .map_err(|e| SyncError::Transport {
                url: url.to_string(),
                reason: format!("curl reported success but left no file: {e}"),
            })?
            .len();

        // Subprocess output is opaque while running; report once at the
        // end so the aggregate still advances.
        on_bytes(size, opts.size_hint.or(Some(size)));
        info!(url, size, "curl fetch complete");
        Ok(size)
    }
}

/// Ordered chain of strategies.
pub struct Transport {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl Transport {
    /// Standard chain: streaming first, curl as fallback.
    pub fn new() -> Self {
        Self {
            strategies: vec![Box::new(StreamingFetch::new()), Box::new(CurlFetch)],
        }
    }

    /// Custom chain, for tests and callers that want a single strategy.
    pub fn with_strategies(strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Try each strategy in order until one lands the file.
    ///
    /// Partial output from a failed attempt is removed before the next
    /// strategy runs, so a fallback never appends to half a file.
    pub fn fetch(
        &self,
        url: &str,
        dest: &Path,
        opts: &FetchOptions,
        on_bytes: ByteProgress,
    ) -> SyncResult<u64> {
        let mut last_reason = String::from("no transport strategies configured");

        for strategy in &self.strategies {
            match strategy.fetch(url, dest, opts, on_bytes) {
                Ok(size) => return Ok(size),
                Err(e) => {
                    warn!(url, strategy = strategy.name(), error = %e, "fetch attempt failed");
                    last_reason = format!("{} failed: {e}", strategy.name());
                    if dest.exists() {
                        if let Err(rm) = fs::remove_file(dest) {
                            warn!(path = %dest.display(), error = %rm, "failed to remove partial file");
                        }
                    }
                }
            }
        }

        Err(SyncError::Transport {
            url: url.to_string(),
            reason: last_reason,
        })
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Strategy that writes fixed bytes or fails, recording call order.
    struct ScriptedFetch {
        label: &'static str,
        payload: Option<&'static [u8]>,
        calls: Arc<AtomicUsize>,
    }

    impl FetchStrategy for ScriptedFetch {
        fn name(&self) -> &'static str {
            self.label
        }

        fn fetch(
            &self,
            url: &str,
            dest: &Path,
            _opts: &FetchOptions,
            on_bytes: ByteProgress,
        ) -> SyncResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.payload {
                Some(bytes) => {
                    std::fs::write(dest, bytes).unwrap();
                    on_bytes(bytes.len() as u64, Some(bytes.len() as u64));
                    Ok(bytes.len() as u64)
                }
                None => {
                    // Leave a partial file behind, like a dropped stream.
                    std::fs::write(dest, b"partial").unwrap();
                    Err(SyncError::Transport {
                        url: url.to_string(),
                        reason: "scripted failure".to_string(),
                    })
                }
            }
        }
    }

    #[test]
    fn test_first_strategy_success_skips_fallback() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.zip");
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));

        let transport = Transport::with_strategies(vec![
            Box::new(ScriptedFetch {
                label: "primary",
                payload: Some(b"content"),
                calls: primary_calls.clone(),
            }),
            Box::new(ScriptedFetch {
                label: "fallback",
                payload: Some(b"other"),
                calls: fallback_calls.clone(),
            }),
        ]);

        let size = transport
            .fetch("http://example.com/a.zip", &dest, &FetchOptions::default(), &|_, _| {})
            .unwrap();

        assert_eq!(size, 7);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_attempt_cleans_partial_before_fallback() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.zip");
        let calls = Arc::new(AtomicUsize::new(0));

        let transport = Transport::with_strategies(vec![
            Box::new(ScriptedFetch {
                label: "primary",
                payload: None,
                calls: calls.clone(),
            }),
            Box::new(ScriptedFetch {
                label: "fallback",
                payload: Some(b"good bytes"),
                calls: calls.clone(),
            }),
        ]);

        let size = transport
            .fetch("http://example.com/a.zip", &dest, &FetchOptions::default(), &|_, _| {})
            .unwrap();

        assert_eq!(size, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"good bytes");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_all_strategies_failing_reports_last_reason() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.zip");
        let calls = Arc::new(AtomicUsize::new(0));

        let transport = Transport::with_strategies(vec![
            Box::new(ScriptedFetch {
                label: "primary",
                payload: None,
                calls: calls.clone(),
            }),
            Box::new(ScriptedFetch {
                label: "fallback",
                payload: None,
                calls: calls.clone(),
            }),
        ]);

        let err = transport
            .fetch("http://example.com/a.zip", &dest, &FetchOptions::default(), &|_, _| {})
            .unwrap_err();

        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(err.to_string().contains("fallback failed"));
        assert!(!dest.exists(), "partial output must not survive");
    }

    #[test]
    fn test_curl_args_carry_retry_and_fail_flags() {
        let opts = FetchOptions {
            referer: Some("http://example.com/mods.html".to_string()),
            size_hint: None,
        };
        let args = CurlFetch::curl_args(
            "http://example.com/a.zip",
            Path::new("/tmp/a.zip.partial"),
            &opts,
        );

        assert!(args.contains(&"-L".to_string()));
        assert!(args.contains(&"--retry".to_string()));
        assert!(args.contains(&"--fail".to_string()));
        assert!(args.contains(&"-e".to_string()));
        assert_eq!(args.last().unwrap(), "http://example.com/a.zip");
        let o_pos = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o_pos + 1], "/tmp/a.zip.partial");
    }

    #[test]
    fn test_validate_rejects_html_behind_success_status() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/html; charset=utf-8".parse().unwrap());

        let err =
            validate_binary_response("http://example.com/a.zip", StatusCode::OK, &headers)
                .unwrap_err();

        assert!(matches!(
            err,
            SyncError::UnexpectedContentType { ref content_type, .. }
                if content_type == "text/html; charset=utf-8"
        ));
    }

    #[test]
    fn test_validate_rejects_error_status() {
        let err = validate_binary_response(
            "http://example.com/a.zip",
            StatusCode::NOT_FOUND,
            &HeaderMap::new(),
        )
        .unwrap_err();

        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_validate_accepts_archive_response() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/zip".parse().unwrap());
        assert!(
            validate_binary_response("http://example.com/a.zip", StatusCode::OK, &headers).is_ok()
        );
        // A missing content-type is common on static mirrors; accept it.
        assert!(validate_binary_response(
            "http://example.com/a.zip",
            StatusCode::OK,
            &HeaderMap::new()
        )
        .is_ok());
    }

    /// Strategy that answers with an error page instead of the archive.
    struct ErrorPageFetch {
        calls: Arc<AtomicUsize>,
    }

    impl FetchStrategy for ErrorPageFetch {
        fn name(&self) -> &'static str {
            "error-page"
        }

        fn fetch(
            &self,
            url: &str,
            _dest: &Path,
            _opts: &FetchOptions,
            _on_bytes: ByteProgress,
        ) -> SyncResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::UnexpectedContentType {
                url: url.to_string(),
                content_type: "text/html".to_string(),
            })
        }
    }

    #[test]
    fn test_unexpected_content_type_falls_back_to_next_strategy() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.zip");
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));

        let transport = Transport::with_strategies(vec![
            Box::new(ErrorPageFetch {
                calls: primary_calls.clone(),
            }),
            Box::new(ScriptedFetch {
                label: "fallback",
                payload: Some(b"good bytes"),
                calls: fallback_calls.clone(),
            }),
        ]);

        let size = transport
            .fetch("http://example.com/a.zip", &dest, &FetchOptions::default(), &|_, _| {})
            .unwrap();

        assert_eq!(size, 10);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_curl_args_without_referer() {
        let args = CurlFetch::curl_args(
            "http://example.com/a.zip",
            Path::new("/tmp/a.zip.partial"),
            &FetchOptions::default(),
        );
        assert!(!args.contains(&"-e".to_string()));
    }
}
