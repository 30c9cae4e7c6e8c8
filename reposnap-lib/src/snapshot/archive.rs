//! Incremental zip construction.
//!
//! The zip writer needs to seek back into the member it is currently writing to patch
//! sizes and checksums, but never touches a member again once the next one has started.
//! [`ArchiveBuilder`] exploits that: it writes into a spool that hands out everything
//! before the current member as soon as the member begins, so only one member's bytes are
//! held at a time.

use super::{FetchOutcome, FetchResult, SnapshotManifest};
use crate::Result;
use bytes::Bytes;
use core::fmt::{Debug, Formatter};
use ohno::IntoAppError;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LOG_TARGET: &str = "   archive";

/// Largest comment the zip format can carry.
const MAX_COMMENT_LEN: usize = u16::MAX as usize;

#[derive(Debug, Default)]
struct SpoolState {
    /// Archive offset of `buf[0]`; everything before it has been handed out.
    drained: u64,
    buf: Vec<u8>,
    pos: u64,
}

/// Seekable sink over the not-yet-final tail of the archive.
#[derive(Debug, Clone, Default)]
struct Spool(Arc<Mutex<SpoolState>>);

impl Spool {
    fn position(&self) -> u64 {
        self.0.lock().expect("lock not poisoned").pos
    }

    /// Hand out the bytes before archive offset `boundary`.
    fn drain_to(&self, boundary: u64) -> Bytes {
        let mut state = self.0.lock().expect("lock not poisoned");
        let len = usize::try_from(boundary.saturating_sub(state.drained))
            .unwrap_or(usize::MAX)
            .min(state.buf.len());
        let chunk: Vec<u8> = state.buf.drain(..len).collect();
        state.drained += chunk.len() as u64;
        Bytes::from(chunk)
    }

    fn drain_all(&self) -> Bytes {
        let mut state = self.0.lock().expect("lock not poisoned");
        let chunk = core::mem::take(&mut state.buf);
        state.drained += chunk.len() as u64;
        Bytes::from(chunk)
    }
}

impl Write for Spool {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.0.lock().expect("lock not poisoned");
        let offset = usize::try_from(state.pos - state.drained).map_err(io::Error::other)?;
        let end = offset + data.len();
        if end > state.buf.len() {
            state.buf.resize(end, 0);
        }
        state.buf[offset..end].copy_from_slice(data);
        state.pos += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Spool {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut state = self.0.lock().expect("lock not poisoned");
        let end = state.drained + state.buf.len() as u64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => end.checked_add_signed(delta),
            SeekFrom::Current(delta) => state.pos.checked_add_signed(delta),
        };

        match target {
            Some(target) if target >= state.drained => {
                state.pos = target;
                Ok(target)
            }
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "seek into a part of the archive that was already emitted")),
        }
    }
}

/// Builds a zip archive from fetch results, emitting bytes as members are added.
///
/// Successful results become members at their repository-relative path; failures are
/// left out of the archive and recorded in the manifest. The manifest is stored as JSON
/// in the archive comment when the archive is finished.
pub struct ArchiveBuilder {
    writer: ZipWriter<Spool>,
    spool: Spool,
    options: FileOptions,
    manifest: SnapshotManifest,
}

impl Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchiveBuilder")
            .field("spool", &self.spool)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    #[must_use]
    pub fn new() -> Self {
        let spool = Spool::default();
        Self {
            writer: ZipWriter::new(spool.clone()),
            spool,
            // No timestamp option: every member gets the fixed zip epoch, which keeps
            // archives of the same snapshot byte-for-byte identical.
            options: FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644),
            manifest: SnapshotManifest::default(),
        }
    }

    #[must_use]
    pub const fn manifest(&self) -> &SnapshotManifest {
        &self.manifest
    }

    /// Add one result and return the archive bytes that became final.
    ///
    /// Results must be appended in path order for the archive to be deterministic.
    pub fn append(&mut self, result: FetchResult) -> Result<Bytes> {
        let FetchResult { entry, outcome, .. } = result;

        match outcome {
            FetchOutcome::Success(bytes) => {
                let boundary = self.spool.position();

                self.writer
                    .start_file(entry.path.as_ref(), self.options)
                    .into_app_err_with(|| format!("adding '{}' to archive", entry.path))?;
                self.writer
                    .write_all(&bytes)
                    .into_app_err_with(|| format!("writing '{}' to archive", entry.path))?;

                self.manifest.record_success();
                log::trace!(target: LOG_TARGET, "Added '{}' ({} bytes)", entry.path, bytes.len());

                Ok(self.spool.drain_to(boundary))
            }
            FetchOutcome::Failure { reason, detail, .. } => {
                self.manifest.record_failure(&entry.path, reason, &detail);
                Ok(Bytes::new())
            }
        }
    }

    /// Write the central directory and return the remaining bytes with the manifest.
    pub fn finish(mut self) -> Result<(Bytes, SnapshotManifest)> {
        self.manifest.seal();
        self.writer.set_comment(comment_json(&self.manifest));

        let _ = self.writer.finish().into_app_err("finishing archive")?;

        log::debug!(
            target: LOG_TARGET,
            "Archive complete: {} of {} file(s) archived",
            self.manifest.succeeded,
            self.manifest.total
        );

        Ok((self.spool.drain_all(), self.manifest))
    }

    /// Build a complete archive in one call, ordering members by path.
    pub fn build(mut results: Vec<FetchResult>) -> Result<(Vec<u8>, SnapshotManifest)> {
        results.sort_by(|a, b| a.entry.path.cmp(&b.entry.path));

        let mut builder = Self::new();
        let mut archive = Vec::new();
        for result in results {
            archive.extend_from_slice(&builder.append(result)?);
        }

        let (tail, manifest) = builder.finish()?;
        archive.extend_from_slice(&tail);
        Ok((archive, manifest))
    }
}

/// Manifest JSON that fits in a zip comment, dropping trailing failure details if needed.
///
/// The kept prefix is sized from the length of each failure entry, so the manifest is
/// serialized in full at most twice however many files failed.
fn comment_json(manifest: &SnapshotManifest) -> String {
    let json = manifest.to_json();
    if json.len() <= MAX_COMMENT_LEN {
        return json;
    }

    let mut abridged = SnapshotManifest {
        total: manifest.total,
        succeeded: manifest.succeeded,
        failed: Vec::new(),
    };

    let mut len = abridged.to_json().len();
    let mut kept = 0;
    for failure in &manifest.failed {
        let Ok(entry) = serde_json::to_string(failure) else {
            break;
        };

        // Every entry after the first is preceded by a comma.
        let added = entry.len() + usize::from(kept > 0);
        if len + added > MAX_COMMENT_LEN {
            break;
        }
        len += added;
        kept += 1;
    }

    log::debug!(
        target: LOG_TARGET,
        "Manifest comment abridged to {kept} of {} failure(s)",
        manifest.failed.len()
    );

    abridged.failed.extend_from_slice(&manifest.failed[..kept]);
    abridged.to_json()
}
