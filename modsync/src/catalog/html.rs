//! HTML listing-page catalog provider.
//!
//! Scrapes archive links out of a plain HTML page. The page is not a
//! structured API: links may appear as `href`, `data-href` or `src`
//! attributes, and sizes only as free text near the link ("1.5 GB").
//! Everything extracted here is treated as best-effort.

use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::fetch::client::{build_client, USER_AGENT};

use super::{CatalogEntry, CatalogProvider};

/// Timeout for the catalog page request.
const PAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Catalog provider that scrapes an HTML listing page.
pub struct HtmlCatalogProvider {
    client: Client,
    page_url: String,
}

impl HtmlCatalogProvider {
    /// Create a provider for the given listing page URL.
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            client: build_client(PAGE_TIMEOUT),
            page_url: page_url.into(),
        }
    }

    /// The listing page URL.
    pub fn page_url(&self) -> &str {
        &self.page_url
    }
}

impl CatalogProvider for HtmlCatalogProvider {
    fn fetch(&self) -> SyncResult<Vec<CatalogEntry>> {
        let response = self
            .client
            .get(&self.page_url)
            .header("User-Agent", USER_AGENT)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Referer", &self.page_url)
            .send()
            .map_err(|e| SyncError::CatalogUnavailable {
                url: self.page_url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(SyncError::CatalogUnavailable {
                url: self.page_url.clone(),
                reason: format!("HTTP {}", status),
            });
        }

        let html = response.text().map_err(|e| SyncError::CatalogUnavailable {
            url: self.page_url.clone(),
            reason: format!("failed to read page body: {}", e),
        })?;

        let base = Url::parse(&self.page_url).map_err(|e| SyncError::CatalogUnavailable {
            url: self.page_url.clone(),
            reason: format!("invalid page URL: {}", e),
        })?;

        let entries = extract_entries(&base, &html);
        info!(count = entries.len(), page = %self.page_url, "scraped catalog entries");
        Ok(entries)
    }
}

/// Extract archive entries from a listing page body.
///
/// Anchors are scanned first so a size parsed from their text wins over
/// the bare-attribute fallback scan; duplicates are collapsed by
/// filename, first occurrence kept.
pub fn extract_entries(base: &Url, html: &str) -> Vec<CatalogEntry> {
    let anchor_re =
        Regex::new(r#"(?is)<a\b[^>]*?(?:href|data-href)\s*=\s*"([^"]+)"[^>]*>(.*?)</a>"#)
            .expect("anchor regex");
    let attr_re = Regex::new(r#"(?i)(?:href|data-href|src)\s*=\s*"([^"]+)""#).expect("attr regex");

    let mut entries: Vec<CatalogEntry> = Vec::new();

    let mut collect = |href: &str, text_for_size: &str| {
        let Some((url, filename)) = resolve_archive_link(base, href) else {
            return;
        };
        if entries.iter().any(|e| e.filename == filename) {
            return;
        }
        let approx_size = parse_approx_size(text_for_size);
        debug!(filename = %filename, url = %url, ?approx_size, "catalog link");
        entries.push(CatalogEntry {
            filename,
            url,
            approx_size,
        });
    };

    for caps in anchor_re.captures_iter(html) {
        collect(&caps[1], &caps[2]);
    }
    for caps in attr_re.captures_iter(html) {
        collect(&caps[1], "");
    }

    entries
}

/// Resolve an href against the page URL and accept it only if it points
/// at an archive. Returns the absolute URL and the derived filename.
fn resolve_archive_link(base: &Url, href: &str) -> Option<(String, String)> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let path = url.path().to_ascii_lowercase();
    if !path.ends_with(".zip") && !path.ends_with(".zipx") {
        return None;
    }

    let filename = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(str::to_string)?;

    Some((url.to_string(), filename))
}

/// Parse a human-readable size ("1.5 GB", "820 MB", "512KB") into bytes.
///
/// Returns `None` when no size-shaped text is present. Comma decimal
/// separators are tolerated.
pub fn parse_approx_size(text: &str) -> Option<u64> {
    let size_re = Regex::new(r"(?i)(\d+[.,]?\d*)\s?(GB|MB|KB)").expect("size regex");
    let caps = size_re.captures(text)?;

    let number: f64 = caps[1].replace(',', ".").parse().ok()?;
    let multiplier = match caps[2].to_ascii_uppercase().as_str() {
        "GB" => 1024.0 * 1024.0 * 1024.0,
        "MB" => 1024.0 * 1024.0,
        _ => 1024.0,
    };

    Some((number * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.com/mods.html?lang=en").unwrap()
    }

    #[test]
    fn test_parse_approx_size_units() {
        assert_eq!(parse_approx_size("512 KB"), Some(512 * 1024));
        assert_eq!(parse_approx_size("820 MB"), Some(820 * 1024 * 1024));
        assert_eq!(
            parse_approx_size("1.5 GB"),
            Some((1.5 * 1024.0 * 1024.0 * 1024.0) as u64)
        );
    }

    #[test]
    fn test_parse_approx_size_comma_decimal() {
        assert_eq!(parse_approx_size("2,5 MB"), Some((2.5 * 1024.0 * 1024.0) as u64));
    }

    #[test]
    fn test_parse_approx_size_absent() {
        assert_eq!(parse_approx_size("mapA.zip"), None);
        assert_eq!(parse_approx_size(""), None);
    }

    #[test]
    fn test_extract_entries_from_anchors_with_sizes() {
        let html = r#"
            <table>
              <tr><td><a href="files/mapA.zip">mapA.zip (820 MB)</a></td></tr>
              <tr><td><a href="files/mapB.zipx">mapB.zipx (1.2 GB)</a></td></tr>
            </table>
        "#;

        let entries = extract_entries(&base(), html);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filename, "mapA.zip");
        assert_eq!(entries[0].url, "http://example.com/files/mapA.zip");
        assert_eq!(entries[0].approx_size, Some(820 * 1024 * 1024));
        assert_eq!(entries[1].filename, "mapB.zipx");
    }

    #[test]
    fn test_extract_entries_ignores_non_archives() {
        let html = r#"
            <a href="style.css">style</a>
            <a href="files/mapA.zip">mapA</a>
            <a href="readme.txt">readme</a>
        "#;

        let entries = extract_entries(&base(), html);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "mapA.zip");
    }

    #[test]
    fn test_extract_entries_strips_query_from_filename() {
        let html = r#"<a href="files/mapA.zip?token=abc">mapA</a>"#;

        let entries = extract_entries(&base(), html);
        assert_eq!(entries[0].filename, "mapA.zip");
        assert_eq!(entries[0].url, "http://example.com/files/mapA.zip?token=abc");
    }

    #[test]
    fn test_extract_entries_deduplicates_by_filename() {
        let html = r#"
            <a href="files/mapA.zip">mapA (100 MB)</a>
            <a href="mirror/mapA.zip">mapA mirror</a>
        "#;

        let entries = extract_entries(&base(), html);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "http://example.com/files/mapA.zip");
        assert_eq!(entries[0].approx_size, Some(100 * 1024 * 1024));
    }

    #[test]
    fn test_extract_entries_absolute_hrefs() {
        let html = r#"<a href="http://mirror.example.org/pack/big.zip">big (1 GB)</a>"#;

        let entries = extract_entries(&base(), html);
        assert_eq!(entries[0].url, "http://mirror.example.org/pack/big.zip");
    }

    #[test]
    fn test_extract_entries_bare_attributes_without_size() {
        let html = r#"<div data-href="files/mapC.zip"></div>"#;

        let entries = extract_entries(&base(), html);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "mapC.zip");
        assert_eq!(entries[0].approx_size, None);
    }
}
