use super::ErrorKind;
use serde::{Deserialize, Serialize};

/// A file that did not make it into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: ErrorKind,
    pub detail: String,
}

/// Per-job summary of how many files were archived and which ones failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub total: usize,
    pub succeeded: usize,
    /// Sorted by path.
    pub failed: Vec<FailedFile>,
}

impl SnapshotManifest {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn record_success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub(crate) fn record_failure(&mut self, path: &str, reason: ErrorKind, detail: &str) {
        self.total += 1;
        self.failed.push(FailedFile {
            path: path.to_string(),
            reason,
            detail: detail.to_string(),
        });
    }

    /// Put the failure list in path order; called once when the job completes.
    pub(crate) fn seal(&mut self) {
        self.failed.sort_by(|a, b| a.path.cmp(&b.path));
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
