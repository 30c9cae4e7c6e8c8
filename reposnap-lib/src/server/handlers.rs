use super::AppState;
use super::http_error::ApiError;
use crate::snapshot::{EntryKind, TreeListing};
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Header carrying the number of files the archive will account for.
pub const SNAPSHOT_TOTAL_HEADER: &str = "x-snapshot-total";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Characters allowed unescaped in an RFC 5987 `filename*` value.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(Debug, Deserialize)]
pub(super) struct RepoQuery {
    repo_url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct DownloadQuery {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FilesResponse {
    reference: String,
    entries: Vec<EntryView>,
    manifest_hint: ManifestHint,
}

#[derive(Debug, Serialize)]
struct EntryView {
    path: String,
    kind: EntryKind,
    size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestHint {
    files: usize,
    directories: usize,
    total_bytes: u64,
    truncated: bool,
}

impl From<TreeListing> for FilesResponse {
    fn from(listing: TreeListing) -> Self {
        let manifest_hint = ManifestHint {
            files: listing.file_count(),
            directories: listing.directory_count(),
            total_bytes: listing.total_bytes(),
            truncated: listing.truncated,
        };

        Self {
            reference: listing.reference.to_string(),
            entries: listing
                .entries
                .into_iter()
                .map(|entry| EntryView {
                    path: entry.path.to_string(),
                    kind: entry.kind,
                    size: entry.size,
                })
                .collect(),
            manifest_hint,
        }
    }
}

pub(super) async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "reposnap is running. Pass a repository URL to /api/files or /api/download_all.",
    }))
}

pub(super) async fn files(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RepoQuery>, QueryRejection>,
) -> Result<Json<FilesResponse>, ApiError> {
    let Query(query) = query?;
    let reference = state.engine.parse_reference(&query.repo_url)?;
    let listing = state.engine.list(reference, &state.shutdown).await?;

    Ok(Json(FilesResponse::from(listing)))
}

pub(super) async fn download(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let locator = state.engine.locator_from_url(&query.url)?;
    let resp = state.engine.fetch_file(&locator, &state.shutdown).await?;

    let content_type = resp.content_type().unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
    let headers = [
        (CONTENT_TYPE, content_type),
        (CONTENT_DISPOSITION, attachment(locator.file_name())),
    ];

    Ok((headers, resp.body).into_response())
}

pub(super) async fn download_all(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RepoQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let reference = state.engine.parse_reference(&query.repo_url)?;

    // A child token, so a finished download does not cancel anything else.
    let prepared = state.engine.stream(reference, state.shutdown.child_token()).await?;

    let headers = [
        (CONTENT_TYPE.as_str(), "application/zip".to_string()),
        (CONTENT_DISPOSITION.as_str(), attachment(&prepared.archive_name())),
        (SNAPSHOT_TOTAL_HEADER, prepared.file_count.to_string()),
    ];

    Ok((headers, Body::from_stream(prepared.into_stream())).into_response())
}

/// `Content-Disposition` value for a download, given a possibly percent-encoded file name.
fn attachment(name: &str) -> String {
    let decoded = percent_decode_str(name).decode_utf8_lossy();
    let fallback: String = decoded
        .chars()
        .map(|c| if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') { c } else { '_' })
        .collect();

    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(&decoded, ATTR_CHAR)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_plain_name() {
        assert_eq!(
            attachment("tokio-master.zip"),
            "attachment; filename=\"tokio-master.zip\"; filename*=UTF-8''tokio-master.zip"
        );
    }

    #[test]
    fn test_attachment_decodes_and_escapes() {
        assert_eq!(
            attachment("read%20me%22%C3%A9.md"),
            "attachment; filename=\"read me__.md\"; filename*=UTF-8''read%20me%22%C3%A9.md"
        );
    }
}
