//! Shared HTTP client construction.

use std::time::Duration;

use reqwest::blocking::Client;

/// Browser-like User-Agent.
///
/// The origin server rejects unknown agents, so every request — probes,
/// catalog page and downloads — identifies as a browser.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36";

/// Default timeout for download requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Build a blocking client with the given timeout.
///
/// Response decompression is disabled so Content-Length values stay
/// comparable with on-disk file sizes.
pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .no_gzip()
        .build()
        .expect("Failed to create HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        // Just verify construction succeeds with a small timeout.
        let _ = build_client(Duration::from_secs(1));
    }
}
