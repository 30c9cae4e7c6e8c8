//! The repository snapshot and archive engine
//!
//! Given a reference to a repository on the hosting provider, this module enumerates the
//! snapshot's file tree, fetches file contents under concurrency and rate constraints, and
//! streams the results into a single zip archive while tolerating per-file failures.
//!
//! # Implementation Model
//!
//! Requests flow through a short pipeline:
//!
//! - [`RepositoryRef::parse`] turns a user URL into an owner/name/revision triple without
//!   touching the network.
//! - The tree fetcher lists every entry of the snapshot in one provider call.
//! - [`FetchOrchestrator`] drives [`ContentFetcher`] over the file entries with a fixed
//!   number of dispatch slots. The fetcher owns the retry policy: rate limits are honored,
//!   transient failures back off exponentially, and definitive rejections stop at once.
//!   A rate-limited worker pauses the shared [`Throttler`] so the others hold off too.
//! - [`ArchiveBuilder`] appends each successful result as a zip member in path order and
//!   hands out finished bytes immediately; failures are recorded in the
//!   [`SnapshotManifest`], which travels in the archive comment.
//!
//! [`SnapshotJob`] tracks one request through these steps and [`Snapshotter`] is the
//! façade the HTTP server and the CLI use.
//!
//! Every provider call goes through the [`Transport`] trait, so the whole engine can run
//! against in-memory doubles with paused time.

mod archive;
mod content_fetcher;
mod engine;
mod error;
mod fetch_result;
mod job;
mod manifest;
mod orchestrator;
mod repo_ref;
mod throttler;
mod transport;
mod tree_entry;
mod tree_fetcher;

pub use archive::ArchiveBuilder;
pub use content_fetcher::{ContentFetcher, RetryPolicy};
pub use engine::{EngineConfig, PreparedSnapshot, Snapshotter};
pub use error::{ErrorKind, SnapshotError};
pub use fetch_result::{FetchOutcome, FetchResult};
pub use job::{ArchiveChunk, JobState, SnapshotJob};
pub use manifest::{FailedFile, SnapshotManifest};
pub use orchestrator::FetchOrchestrator;
pub use repo_ref::{DEFAULT_REVISION, RepositoryRef};
pub use throttler::Throttler;
pub use transport::{ApiResult, HttpTransport, RawResponse, Transport, TransportFailure, classify};
pub use tree_entry::{ContentLocator, EntryKind, TreeEntry, TreeListing};
pub use tree_fetcher::TreeFetcher;
