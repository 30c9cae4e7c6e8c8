use core::time::Duration;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Classification of everything that can go wrong while snapshotting a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The user-supplied repository URL does not have the provider's shape.
    InvalidReference,

    /// The provider does not know the repository, its revision, or the requested file.
    RepositoryNotFound,

    /// The provider throttled the request.
    RateLimited,

    /// The request never produced a response (connection failure, timeout).
    NetworkTransient,

    /// A file could not be fetched within the retry ceiling.
    FetchExhausted,

    /// The provider answered with an unexpected status or a malformed body.
    UpstreamError,

    /// The job was cancelled, usually because the client went away.
    Cancelled,

    /// The job ran past its deadline.
    TimedOut,
}

/// Errors produced by the snapshot engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid repository reference: {0}")]
    InvalidReference(String),

    #[error("repository '{0}' not found")]
    RepositoryNotFound(String),

    #[error("rate limited by the hosting provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("network failure: {0}")]
    NetworkTransient(String),

    #[error("gave up after {attempts} attempt(s), last failure was {last_reason}: {detail}")]
    FetchExhausted {
        last_reason: ErrorKind,
        attempts: u32,
        detail: String,
    },

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("snapshot cancelled")]
    Cancelled,

    #[error("snapshot exceeded its time limit")]
    TimedOut,
}

impl SnapshotError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidReference(_) => ErrorKind::InvalidReference,
            Self::RepositoryNotFound(_) => ErrorKind::RepositoryNotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NetworkTransient(_) => ErrorKind::NetworkTransient,
            Self::FetchExhausted { .. } => ErrorKind::FetchExhausted,
            Self::UpstreamError(_) => ErrorKind::UpstreamError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::TimedOut => ErrorKind::TimedOut,
        }
    }

    /// Whether a later attempt at the same request could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::NetworkTransient(_) | Self::UpstreamError(_))
    }
}
