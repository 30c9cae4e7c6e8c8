//! Listing the file tree of a repository snapshot.

use super::transport::{ApiResult, Transport, classify};
use super::{ContentLocator, RepositoryRef, SnapshotError, TreeEntry, TreeListing};
use chrono::Utc;
use core::time::Duration;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "      tree";

/// Response of the provider's git-tree endpoint.
#[derive(Debug, Deserialize)]
struct GitTree {
    tree: Vec<GitTreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitTreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: GitTreeItemKind,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum GitTreeItemKind {
    Blob,
    Tree,
    /// Submodule pointer; has no content of its own.
    Commit,
}

/// Lists repository trees through the provider's recursive tree endpoint.
#[derive(Debug, Clone)]
pub struct TreeFetcher {
    transport: Arc<dyn Transport>,
    api_base: Url,
    raw_base: Url,
    request_timeout: Duration,
}

impl TreeFetcher {
    pub fn new(transport: Arc<dyn Transport>, api_base: Url, raw_base: Url, request_timeout: Duration) -> Self {
        Self {
            transport,
            api_base,
            raw_base,
            request_timeout,
        }
    }

    #[must_use]
    pub const fn raw_base(&self) -> &Url {
        &self.raw_base
    }

    /// List every file and directory of a snapshot, sorted by path.
    ///
    /// Makes exactly one request and never retries; throttling and transient failures are
    /// reported to the caller.
    pub async fn list_files(&self, reference: &RepositoryRef) -> Result<TreeListing, SnapshotError> {
        let url = self.tree_url(reference)?;
        log::info!(target: LOG_TARGET, "Listing tree of '{reference}'");

        let resp = match tokio::time::timeout(self.request_timeout, self.transport.get(&url)).await {
            Err(_) => {
                return Err(SnapshotError::NetworkTransient(format!(
                    "listing '{reference}' timed out after {}ms",
                    self.request_timeout.as_millis()
                )));
            }
            Ok(Err(failure)) => return Err(SnapshotError::NetworkTransient(failure.detail)),
            Ok(Ok(resp)) => resp,
        };

        let resp = match classify(resp, Utc::now()) {
            ApiResult::Success(resp) => resp,
            ApiResult::RateLimited(retry_after) => {
                log::warn!(target: LOG_TARGET, "Rate limited while listing '{reference}'");
                return Err(SnapshotError::RateLimited { retry_after });
            }
            ApiResult::NotFound => return Err(SnapshotError::RepositoryNotFound(reference.to_string())),
            // An empty repository has no tree to list.
            ApiResult::Rejected(StatusCode::CONFLICT) => {
                log::info!(target: LOG_TARGET, "Repository '{reference}' is empty");
                return Ok(TreeListing {
                    reference: reference.clone(),
                    entries: Vec::new(),
                    truncated: false,
                });
            }
            ApiResult::Rejected(status) | ApiResult::Failed(status) => {
                return Err(SnapshotError::UpstreamError(format!("listing '{reference}' returned HTTP {status}")));
            }
        };

        let tree: GitTree = serde_json::from_slice(&resp.body)
            .map_err(|e| SnapshotError::UpstreamError(format!("malformed tree listing for '{reference}': {e}")))?;

        if tree.truncated {
            log::warn!(target: LOG_TARGET, "Tree listing for '{reference}' was truncated by the provider; some files will be missing");
        }

        let mut entries = Vec::with_capacity(tree.tree.len());
        for item in tree.tree {
            match item.kind {
                GitTreeItemKind::Blob => {
                    let locator = self.locator(reference, &item.path)?;
                    entries.push(TreeEntry::file(item.path, item.size.unwrap_or(0), locator));
                }
                GitTreeItemKind::Tree => entries.push(TreeEntry::directory(item.path)),
                GitTreeItemKind::Commit => {
                    log::debug!(target: LOG_TARGET, "Skipping submodule '{}' in '{reference}'", item.path);
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));

        log::debug!(target: LOG_TARGET, "Listed {} entries for '{reference}'", entries.len());

        Ok(TreeListing {
            reference: reference.clone(),
            entries,
            truncated: tree.truncated,
        })
    }

    fn tree_url(&self, reference: &RepositoryRef) -> Result<Url, SnapshotError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| SnapshotError::UpstreamError(format!("API base URL '{}' cannot have a path", self.api_base)))?;
            let _ = segments
                .pop_if_empty()
                .extend(["repos", reference.owner(), reference.name(), "git", "trees"])
                .extend(reference.revision().split('/'));
        }
        let _ = url.query_pairs_mut().append_pair("recursive", "1");
        Ok(url)
    }

    /// Raw-content URL of a file; each path segment is percent-encoded.
    fn locator(&self, reference: &RepositoryRef, path: &str) -> Result<ContentLocator, SnapshotError> {
        let mut url = self.raw_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| SnapshotError::UpstreamError(format!("raw base URL '{}' cannot have a path", self.raw_base)))?;
            let _ = segments
                .pop_if_empty()
                .extend([reference.owner(), reference.name()])
                .extend(reference.revision().split('/'))
                .extend(path.split('/'));
        }
        Ok(ContentLocator::new(url))
    }
}
