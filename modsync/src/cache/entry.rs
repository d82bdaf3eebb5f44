//! Per-file provenance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance and content metadata for one cached file.
///
/// An entry exists for a filename iff the file was downloaded by this
/// system at least once, or was found pre-existing on disk and seeded.
/// The JSON field names match the original launcher's `cache.json` so
/// an existing ledger keeps working.
///
/// `etag` and `last_modified` are advisory only: they are captured from
/// probe responses and stored, but the staleness decision never
/// consults them. The origin server does not expose reliable
/// validators, so the decision is size-based instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// URL the file was (or would be) downloaded from.
    pub source_url: String,

    /// Lowercase hex SHA-256 of the file bytes.
    ///
    /// May be absent until lazily computed; always set after a
    /// successful download.
    #[serde(rename = "sha256", default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Size of the file in bytes at the time the entry was recorded.
    #[serde(rename = "size", default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// Advisory ETag from the last probe or download response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Advisory Last-Modified from the last probe or download response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// When the file was last downloaded or seeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create an entry for a freshly downloaded file.
    pub fn downloaded(
        source_url: impl Into<String>,
        content_hash: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            content_hash: Some(content_hash.into()),
            size_bytes: Some(size_bytes),
            etag: None,
            last_modified: None,
            downloaded_at: Some(Utc::now()),
        }
    }

    /// Attach advisory validators captured from a response.
    pub fn with_validators(
        mut self,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Self {
        self.etag = etag;
        self.last_modified = last_modified;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_original_field_names() {
        let entry = CacheEntry::downloaded("http://example.com/mapA.zip", "abc123", 1024);
        let raw = serde_json::to_string(&entry).unwrap();

        assert!(raw.contains("\"sourceUrl\""));
        assert!(raw.contains("\"sha256\""));
        assert!(raw.contains("\"size\""));
        assert!(raw.contains("\"downloadedAt\""));
    }

    #[test]
    fn test_entry_tolerates_sparse_documents() {
        // A ledger written before hashes were computed.
        let entry: CacheEntry =
            serde_json::from_str(r#"{"sourceUrl": "http://example.com/a.zip"}"#).unwrap();

        assert_eq!(entry.source_url, "http://example.com/a.zip");
        assert!(entry.content_hash.is_none());
        assert!(entry.size_bytes.is_none());
        assert!(entry.downloaded_at.is_none());
    }

    #[test]
    fn test_with_validators() {
        let entry = CacheEntry::downloaded("http://example.com/a.zip", "abc", 1)
            .with_validators(Some("\"etag\"".to_string()), None);

        assert_eq!(entry.etag.as_deref(), Some("\"etag\""));
        assert!(entry.last_modified.is_none());
    }
}
