//! The per-request lifecycle of a snapshot.

use super::archive::ArchiveBuilder;
use super::orchestrator::FetchOrchestrator;
use super::tree_fetcher::TreeFetcher;
use super::{RepositoryRef, SnapshotError, SnapshotManifest, TreeListing};
use bytes::Bytes;
use core::pin::pin;
use core::time::Duration;
use futures::StreamExt;
use strum::{Display, IntoStaticStr};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "       job";

/// Archive bytes, or the reason the archive was abandoned.
pub type ArchiveChunk = Result<Bytes, SnapshotError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum JobState {
    Pending,
    Listing,
    Fetching,
    Archiving,
    Done,
    Failed,
}

/// One snapshot request, from listing to the last archive byte.
///
/// Only listing can fail a job. Once files are being fetched, per-file failures end up in
/// the manifest; cancellation, a vanished reader, or the deadline abandon the job instead,
/// leaving it in the state it had reached with the reason recorded in [`failure`](Self::failure).
#[derive(Debug)]
pub struct SnapshotJob {
    reference: RepositoryRef,
    state: JobState,
    manifest: Option<SnapshotManifest>,
    failure: Option<SnapshotError>,
    deadline: Instant,
}

impl SnapshotJob {
    #[must_use]
    pub fn new(reference: RepositoryRef, timeout: Duration) -> Self {
        Self {
            reference,
            state: JobState::Pending,
            manifest: None,
            failure: None,
            deadline: Instant::now() + timeout,
        }
    }

    #[must_use]
    pub const fn reference(&self) -> &RepositoryRef {
        &self.reference
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Available once the job is done.
    #[must_use]
    pub const fn manifest(&self) -> Option<&SnapshotManifest> {
        self.manifest.as_ref()
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&SnapshotError> {
        self.failure.as_ref()
    }

    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// List the snapshot's tree, moving the job on to fetching.
    pub async fn list(&mut self, tree: &TreeFetcher, cancel: &CancellationToken) -> Result<TreeListing, SnapshotError> {
        debug_assert_eq!(self.state, JobState::Pending, "a job is listed once");
        self.transition(JobState::Listing);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SnapshotError::Cancelled),
            () = sleep_until(self.deadline) => Err(SnapshotError::TimedOut),
            result = tree.list_files(&self.reference) => result,
        };

        match result {
            Ok(listing) => {
                self.transition(JobState::Fetching);
                Ok(listing)
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Listing '{}' failed: {e}", self.reference);
                self.failure = Some(e.clone());
                self.transition(JobState::Failed);
                Err(e)
            }
        }
    }

    /// Fetch every file of `listing` and stream the archive into `sink`.
    ///
    /// Archiving starts with the first fetch result. A full `sink` holds back further
    /// fetches until the reader catches up.
    pub async fn archive(
        &mut self,
        listing: TreeListing,
        orchestrator: &FetchOrchestrator,
        sink: &mpsc::Sender<ArchiveChunk>,
        cancel: &CancellationToken,
    ) -> Result<SnapshotManifest, SnapshotError> {
        debug_assert_eq!(self.state, JobState::Fetching, "a job is archived after listing");

        let fetch_cancel = cancel.child_token();
        let result = self.pipeline(listing, orchestrator, sink, cancel, &fetch_cancel).await;
        fetch_cancel.cancel();

        match result {
            Ok(manifest) => {
                self.manifest = Some(manifest.clone());
                self.transition(JobState::Done);
                Ok(manifest)
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Abandoning snapshot of '{}' while {}: {e}", self.reference, self.state);
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn pipeline(
        &mut self,
        listing: TreeListing,
        orchestrator: &FetchOrchestrator,
        sink: &mpsc::Sender<ArchiveChunk>,
        cancel: &CancellationToken,
        fetch_cancel: &CancellationToken,
    ) -> Result<SnapshotManifest, SnapshotError> {
        let mut results = pin!(orchestrator.stream(listing.into_files(), fetch_cancel));
        let mut builder = ArchiveBuilder::new();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SnapshotError::Cancelled),
                () = sleep_until(self.deadline) => return Err(SnapshotError::TimedOut),
                () = sink.closed() => return Err(SnapshotError::Cancelled),
                next = results.next() => next,
            };

            let Some(result) = next else {
                break;
            };

            if self.state == JobState::Fetching {
                self.transition(JobState::Archiving);
            }

            let chunk = builder.append(result).map_err(archive_failure)?;
            self.emit(sink, chunk, cancel).await?;
        }

        if self.state == JobState::Fetching {
            self.transition(JobState::Archiving);
        }

        let (tail, manifest) = builder.finish().map_err(archive_failure)?;
        self.emit(sink, tail, cancel).await?;

        log::info!(
            target: LOG_TARGET,
            "Snapshot of '{}' complete: {} of {} file(s) archived",
            self.reference,
            manifest.succeeded,
            manifest.total
        );

        Ok(manifest)
    }

    async fn emit(&self, sink: &mpsc::Sender<ArchiveChunk>, chunk: Bytes, cancel: &CancellationToken) -> Result<(), SnapshotError> {
        if chunk.is_empty() {
            return Ok(());
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SnapshotError::Cancelled),
            () = sleep_until(self.deadline) => Err(SnapshotError::TimedOut),
            sent = sink.send(Ok(chunk)) => sent.map_err(|_| SnapshotError::Cancelled),
        }
    }

    fn transition(&mut self, next: JobState) {
        log::debug!(target: LOG_TARGET, "'{}': {} -> {next}", self.reference, self.state);
        self.state = next;
    }
}

fn archive_failure(e: ohno::AppError) -> SnapshotError {
    SnapshotError::UpstreamError(format!("building archive: {e}"))
}
