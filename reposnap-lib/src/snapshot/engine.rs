use super::content_fetcher::{ContentFetcher, RetryPolicy};
use super::job::{ArchiveChunk, SnapshotJob};
use super::orchestrator::FetchOrchestrator;
use super::transport::{RawResponse, Transport};
use super::tree_fetcher::TreeFetcher;
use super::{ContentLocator, RepositoryRef, SnapshotError, SnapshotManifest, TreeListing};
use core::time::Duration;
use futures::{Stream, stream};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

const LOG_TARGET: &str = "    engine";

/// Settings the engine needs, independent of where they were loaded from.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Host name repository URLs must use.
    pub host: String,
    pub api_base_url: Url,
    /// Prefix of every content locator.
    pub raw_base_url: Url,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Bound on a whole snapshot, from listing to the last archive byte.
    pub job_timeout: Duration,
    /// Archive chunks buffered ahead of a slow reader.
    pub output_buffer: usize,
}

/// A snapshot whose listing succeeded and whose archive is being produced.
#[derive(Debug)]
pub struct PreparedSnapshot {
    pub reference: RepositoryRef,
    pub file_count: usize,
    pub directory_count: usize,
    pub total_bytes: u64,
    pub truncated: bool,
    chunks: mpsc::Receiver<ArchiveChunk>,
    task: JoinHandle<Result<SnapshotManifest, SnapshotError>>,
}

impl PreparedSnapshot {
    /// File name for the downloaded archive.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.reference.archive_stem())
    }

    /// Archive bytes in order. An `Err` item means the archive was abandoned and is incomplete.
    ///
    /// Dropping the stream stops the job.
    pub fn into_stream(self) -> impl Stream<Item = ArchiveChunk> + Send {
        stream::unfold(self.chunks, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) })
    }

    /// The next piece of the archive, or `None` once it is complete.
    pub async fn next_chunk(&mut self) -> Option<ArchiveChunk> {
        self.chunks.recv().await
    }

    /// Wait for the job behind this snapshot and return its manifest.
    ///
    /// Call after [`next_chunk`](Self::next_chunk) returned `None`; a job still waiting
    /// for its reader would otherwise never finish.
    pub async fn finish(self) -> Result<SnapshotManifest, SnapshotError> {
        drop(self.chunks);
        self.task
            .await
            .map_err(|e| SnapshotError::UpstreamError(format!("archive task failed: {e}")))?
    }

    /// Read the whole archive into memory.
    pub async fn collect(mut self) -> Result<(Vec<u8>, SnapshotManifest), SnapshotError> {
        let mut archive = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            archive.extend_from_slice(&chunk?);
        }

        let manifest = self.finish().await?;
        Ok((archive, manifest))
    }
}

/// Entry point to the snapshot engine.
///
/// Cheap to clone; every clone shares the same transport and fetchers. Each operation
/// creates its own [`SnapshotJob`], so concurrent requests never share job state.
#[derive(Debug, Clone)]
pub struct Snapshotter {
    tree: TreeFetcher,
    content: Arc<ContentFetcher>,
    orchestrator: FetchOrchestrator,
    config: Arc<EngineConfig>,
}

impl Snapshotter {
    pub fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let tree = TreeFetcher::new(
            Arc::clone(&transport),
            config.api_base_url.clone(),
            config.raw_base_url.clone(),
            config.retry.request_timeout,
        );
        let content = Arc::new(ContentFetcher::new(transport, config.retry));
        let orchestrator = FetchOrchestrator::new(Arc::clone(&content), config.concurrency);

        Self {
            tree,
            content,
            orchestrator,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse a user-supplied repository URL for the configured host.
    pub fn parse_reference(&self, input: &str) -> Result<RepositoryRef, SnapshotError> {
        RepositoryRef::parse(input, &self.config.host)
    }

    pub async fn list(&self, reference: RepositoryRef, cancel: &CancellationToken) -> Result<TreeListing, SnapshotError> {
        let mut job = SnapshotJob::new(reference, self.config.job_timeout);
        job.list(&self.tree, cancel).await
    }

    /// Accept a single-file URL only if it points below the raw-content base.
    pub fn locator_from_url(&self, input: &str) -> Result<ContentLocator, SnapshotError> {
        let url = Url::parse(input.trim()).map_err(|e| SnapshotError::InvalidReference(format!("'{input}' is not a URL: {e}")))?;
        let base = &self.config.raw_base_url;

        let base_path = base.path().trim_end_matches('/');
        let within_base = url.scheme() == base.scheme()
            && url.host_str() == base.host_str()
            && url.port_or_known_default() == base.port_or_known_default()
            && url
                .path()
                .strip_prefix(base_path)
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|rest| !rest.is_empty());

        if !within_base {
            return Err(SnapshotError::InvalidReference(format!("'{input}' is not a raw-content URL under '{base}'")));
        }

        Ok(ContentLocator::new(url))
    }

    /// Fetch one file with the usual retry policy, outside the bounded pool.
    pub async fn fetch_file(&self, locator: &ContentLocator, cancel: &CancellationToken) -> Result<RawResponse, SnapshotError> {
        self.content.fetch_locator(locator, cancel).await
    }

    /// List the snapshot, then archive it in the background.
    ///
    /// Listing errors are returned here. After that, archive bytes arrive through the
    /// returned [`PreparedSnapshot`], which holds at most `output_buffer` chunks; a reader
    /// that falls behind stops new fetches from being dispatched.
    pub async fn stream(&self, reference: RepositoryRef, cancel: CancellationToken) -> Result<PreparedSnapshot, SnapshotError> {
        let mut job = SnapshotJob::new(reference.clone(), self.config.job_timeout);
        let listing = job.list(&self.tree, &cancel).await?;

        let file_count = listing.file_count();
        let directory_count = listing.directory_count();
        let total_bytes = listing.total_bytes();
        let truncated = listing.truncated;

        let (tx, rx) = mpsc::channel(self.config.output_buffer.max(1));
        let orchestrator = self.orchestrator.clone();

        log::info!(target: LOG_TARGET, "Archiving {file_count} file(s) of '{reference}'");

        let task = tokio::spawn(async move {
            let result = job.archive(listing, &orchestrator, &tx, &cancel).await;
            if let Err(e) = &result {
                // The reader may already be gone, in which case nobody needs to hear about it.
                let _ = tx.send(Err(e.clone())).await;
            }
            result
        });

        Ok(PreparedSnapshot {
            reference,
            file_count,
            directory_count,
            total_bytes,
            truncated,
            chunks: rx,
            task,
        })
    }

    /// Produce the whole archive in memory.
    pub async fn collect(&self, reference: RepositoryRef, cancel: CancellationToken) -> Result<(Vec<u8>, SnapshotManifest), SnapshotError> {
        self.stream(reference, cancel).await?.collect().await
    }
}
