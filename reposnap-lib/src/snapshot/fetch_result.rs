use super::{ErrorKind, SnapshotError, TreeEntry};
use bytes::Bytes;

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The file's raw contents.
    Success(Bytes),

    /// The file could not be fetched.
    Failure {
        reason: ErrorKind,
        /// What the last attempt ran into.
        last_reason: ErrorKind,
        attempts: u32,
        detail: String,
    },
}

/// The result of fetching one tree entry.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Position of the entry in tree order.
    pub index: usize,
    pub entry: TreeEntry,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    #[must_use]
    pub fn success(index: usize, entry: TreeEntry, bytes: Bytes) -> Self {
        Self {
            index,
            entry,
            outcome: FetchOutcome::Success(bytes),
        }
    }

    #[must_use]
    pub fn failure(index: usize, entry: TreeEntry, error: &SnapshotError) -> Self {
        let (last_reason, attempts, detail) = match error {
            SnapshotError::FetchExhausted {
                last_reason,
                attempts,
                detail,
            } => (*last_reason, *attempts, detail.clone()),
            other => (other.kind(), 0, other.to_string()),
        };

        Self {
            index,
            entry,
            outcome: FetchOutcome::Failure {
                reason: error.kind(),
                last_reason,
                attempts,
                detail,
            },
        }
    }

    #[must_use]
    pub fn from_result(index: usize, entry: TreeEntry, result: Result<Bytes, SnapshotError>) -> Self {
        match result {
            Ok(bytes) => Self::success(index, entry, bytes),
            Err(e) => Self::failure(index, entry, &e),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Success(_))
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.entry.path
    }
}
