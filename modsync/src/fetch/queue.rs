//! Download queue bookkeeping.

/// One file scheduled for download.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub filename: String,
    pub url: String,
    /// Size estimate from planning (probe length or catalog hint).
    /// Used for aggregate totals only; the wire total wins per file.
    pub size_hint: Option<u64>,
}

impl QueueItem {
    pub fn new(filename: impl Into<String>, url: impl Into<String>, size_hint: Option<u64>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
            size_hint,
        }
    }
}

/// Outcome of one queue item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Downloaded { bytes: u64 },
    Skipped { reason: String },
    Failed { message: String },
}

/// Accumulated results of draining a queue.
#[derive(Debug, Default)]
pub struct QueueReport {
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl QueueReport {
    pub fn record(&mut self, filename: &str, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Downloaded { .. } => self.downloaded.push(filename.to_string()),
            ItemOutcome::Skipped { .. } => self.skipped.push(filename.to_string()),
            ItemOutcome::Failed { message } => {
                self.failed.push((filename.to_string(), message.clone()))
            }
        }
    }

    /// True when every item either downloaded or skipped cleanly.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_buckets_outcomes() {
        let mut report = QueueReport::default();
        report.record("a.zip", &ItemOutcome::Downloaded { bytes: 10 });
        report.record(
            "b.zip",
            &ItemOutcome::Skipped {
                reason: "up to date".to_string(),
            },
        );
        report.record(
            "c.zip",
            &ItemOutcome::Failed {
                message: "timeout".to_string(),
            },
        );

        assert_eq!(report.downloaded, vec!["a.zip"]);
        assert_eq!(report.skipped, vec!["b.zip"]);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_clean());
    }
}
