//! A single resumable upload and its chunk store.

use crate::error::{Result, UploadError};
use crate::sweeper::Sweeper;
use std::collections::BTreeMap;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string. Any malformed input is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0.as_simple())
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

/// Result of appending a chunk to a session.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk was stored; more are expected.
    Stored,
    /// The chunk completed the upload; the target file has been published.
    Completed,
}

/// A chunk persisted in the session's scratch directory.
struct StoredChunk {
    path: PathBuf,
    len: u64,
}

/// An open upload with its own scratch directory.
///
/// Chunks may arrive at arbitrary offsets and in any order. Combination
/// triggers as soon as the furthest stored byte reaches the declared
/// total length: all chunks are stitched together in ascending offset
/// order and the result is published to the target path. A duplicate offset replaces
/// the earlier chunk; the stale scratch file is removed with the rest
/// of the directory when the session closes.
pub struct UploadSession {
    id: UploadId,
    scratch_dir: PathBuf,
    chunks: BTreeMap<u64, StoredChunk>,
    target: Option<PathBuf>,
    total_len: Option<u64>,
    next_seq: u64,
    closed: bool,
}

impl UploadSession {
    /// Create a session with a fresh scratch directory under `scratch_root`.
    pub async fn create(scratch_root: &Path) -> Result<Self> {
        let id = UploadId::new();
        let scratch_dir = scratch_root.join(id.to_string());
        fs::create_dir_all(&scratch_dir).await?;
        tracing::debug!(upload_id = %id, scratch = %scratch_dir.display(), "created upload session");
        Ok(Self {
            id,
            scratch_dir,
            chunks: BTreeMap::new(),
            target: None,
            total_len: None,
            next_seq: 0,
            closed: false,
        })
    }

    /// Session identifier.
    pub fn id(&self) -> UploadId {
        self.id
    }

    /// The target path, once known.
    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Begin the single-pass path: create the target file and hand back a
    /// writer for the caller to drain the client stream into.
    pub async fn begin_whole(&mut self, target: PathBuf) -> Result<WholeFile> {
        let file = File::create(&target).await?;
        tracing::info!(upload_id = %self.id, target = %target.display(), "writing whole file");
        self.target = Some(target);
        Ok(WholeFile { file, written: 0 })
    }

    /// Store one chunk at `offset`.
    ///
    /// The first call must carry the declared total length and target name;
    /// later calls may omit them. A chunk whose range falls outside
    /// `0..total` is rejected before anything touches the disk. Once the
    /// stored chunks reach the declared total length the session combines
    /// everything and publishes the target, returning
    /// [`ChunkOutcome::Completed`]. A detected coverage gap fails the call
    /// but leaves the session open so the missing chunks can be resent.
    pub async fn append_chunk(
        &mut self,
        offset: u64,
        declared_total: Option<u64>,
        target: Option<PathBuf>,
        data: &[u8],
    ) -> Result<ChunkOutcome> {
        let total = match self.total_len {
            Some(total) => total,
            None => {
                let total = declared_total.ok_or(UploadError::MissingLength)?;
                self.total_len = Some(total);
                total
            }
        };
        if self.target.is_none() {
            let target = target.ok_or(UploadError::MissingTarget)?;
            tracing::info!(
                upload_id = %self.id,
                target = %target.display(),
                total_len = total,
                "started chunked upload"
            );
            self.target = Some(target);
        }
        let len = data.len() as u64;
        offset
            .checked_add(len)
            .filter(|end| *end <= total)
            .ok_or(UploadError::OutOfRange { offset, len, total })?;

        let seq = self.next_seq;
        self.next_seq += 1;
        let chunk_path = self.scratch_dir.join(format!("chunk-{offset}-{seq}"));
        fs::write(&chunk_path, data).await?;
        tracing::debug!(upload_id = %self.id, offset, len, "stored chunk");
        self.chunks.insert(
            offset,
            StoredChunk {
                path: chunk_path,
                len,
            },
        );

        if self.stored_end() >= total {
            self.combine().await?;
            return Ok(ChunkOutcome::Completed);
        }
        Ok(ChunkOutcome::Stored)
    }

    /// Furthest byte any stored chunk reaches. Chunk ranges are bounded by
    /// the declared total at append time, so the sum cannot overflow.
    fn stored_end(&self) -> u64 {
        self.chunks
            .iter()
            .map(|(offset, chunk)| offset + chunk.len)
            .max()
            .unwrap_or(0)
    }

    /// Highest chunk offset stored so far, for resume queries.
    pub fn current_offset(&self) -> u64 {
        self.chunks.keys().next_back().copied().unwrap_or(0)
    }

    /// Delete the target file if one was written or captured.
    ///
    /// Reverting a session that never named a target, or whose target was
    /// already removed, succeeds.
    pub async fn revert(&mut self) -> Result<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        tracing::info!(upload_id = %self.id, target = %target.display(), "reverting upload");
        match fs::remove_file(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Release the session's scratch directory via the sweeper.
    ///
    /// Idempotent: eviction racing an explicit removal schedules the
    /// deletion once.
    pub fn close(&mut self, sweeper: &Sweeper) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::debug!(upload_id = %self.id, "closing upload session");
        sweeper.schedule(self.scratch_dir.clone());
    }

    /// Stitch all chunks together and publish the target file.
    async fn combine(&mut self) -> Result<()> {
        let target = self.target.clone().ok_or(UploadError::MissingTarget)?;
        self.check_coverage()?;

        let started = Instant::now();
        let combined_path = self.scratch_dir.join("combined");
        let mut combined = File::create(&combined_path).await?;
        for (offset, chunk) in &self.chunks {
            let data = fs::read(&chunk.path).await?;
            combined.seek(SeekFrom::Start(*offset)).await?;
            combined.write_all(&data).await?;
        }
        combined.flush().await?;
        drop(combined);

        publish(&combined_path, &target).await?;
        tracing::info!(
            upload_id = %self.id,
            target = %target.display(),
            chunks = self.chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "combined chunked upload"
        );
        Ok(())
    }

    /// Verify the stored chunks cover `0..total` without holes. Overlapping
    /// chunks are fine; later data at an offset already won the map.
    fn check_coverage(&self) -> Result<()> {
        let total = self.total_len.unwrap_or(0);
        let mut covered = 0u64;
        for (offset, chunk) in &self.chunks {
            if *offset > covered {
                return Err(UploadError::Gap {
                    covered,
                    offset: *offset,
                });
            }
            covered = covered.max(offset + chunk.len);
        }
        if covered < total {
            return Err(UploadError::Short { covered, total });
        }
        Ok(())
    }
}

/// Move the combined file into place. Scratch and files directories may
/// live on different filesystems, so a failed rename falls back to copy.
async fn publish(combined: &Path, target: &Path) -> Result<()> {
    if fs::rename(combined, target).await.is_ok() {
        return Ok(());
    }
    fs::copy(combined, target).await?;
    Ok(())
}

/// Writer for the single-pass whole-file path.
pub struct WholeFile {
    file: File,
    written: u64,
}

impl WholeFile {
    /// Append a piece of the client stream to the target file.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flush and return the number of bytes written.
    pub async fn finish(mut self) -> Result<u64> {
        self.file.flush().await?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn upload_id_round_trip() {
        let id = UploadId::new();
        assert_eq!(UploadId::parse(&id.to_string()), Some(id));
        assert_eq!(UploadId::parse(&format!("  {id} \n")), Some(id));
        assert!(UploadId::parse("not-an-id").is_none());
    }

    #[tokio::test]
    async fn out_of_order_chunks_complete_on_second_append() {
        let dir = scratch();
        let target = dir.path().join("hello.txt");
        let mut session = UploadSession::create(dir.path()).await.unwrap();

        // The tail arrives first: it reaches the declared end, but bytes
        // 0..5 are missing, so the combine attempt is rejected.
        let err = session
            .append_chunk(5, Some(10), Some(target.clone()), b"FGHIJ")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Gap { covered: 0, offset: 5 }));
        assert_eq!(session.current_offset(), 5);
        assert!(!target.exists());

        // Filling the hole completes coverage; no tail resend is needed.
        let outcome = session.append_chunk(0, None, None, b"ABCDE").await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Completed);
        assert_eq!(fs::read(&target).await.unwrap(), b"ABCDEFGHIJ");
    }

    #[tokio::test]
    async fn in_order_chunks_complete_on_final() {
        let dir = scratch();
        let target = dir.path().join("hello.txt");
        let mut session = UploadSession::create(dir.path()).await.unwrap();

        let first = session
            .append_chunk(0, Some(10), Some(target.clone()), b"ABCDE")
            .await
            .unwrap();
        assert_eq!(first, ChunkOutcome::Stored);
        let last = session.append_chunk(5, None, None, b"FGHIJ").await.unwrap();
        assert_eq!(last, ChunkOutcome::Completed);
        assert_eq!(fs::read(&target).await.unwrap(), b"ABCDEFGHIJ");
    }

    #[tokio::test]
    async fn gap_rejects_and_session_stays_open() {
        let dir = scratch();
        let target = dir.path().join("gapped.txt");
        let mut session = UploadSession::create(dir.path()).await.unwrap();

        // Bytes 0..3 never arrive, final chunk reaches the declared end.
        let err = session
            .append_chunk(3, Some(6), Some(target.clone()), b"DEF")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Gap { covered: 0, offset: 3 }));
        assert!(!target.exists());

        // The rejected chunk stays stored; filling the hole completes.
        let outcome = session.append_chunk(0, None, None, b"ABC").await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Completed);
        assert_eq!(fs::read(&target).await.unwrap(), b"ABCDEF");
    }

    #[tokio::test]
    async fn duplicate_offset_last_write_wins() {
        let dir = scratch();
        let target = dir.path().join("dup.txt");
        let mut session = UploadSession::create(dir.path()).await.unwrap();

        session
            .append_chunk(0, Some(6), Some(target.clone()), b"xxx")
            .await
            .unwrap();
        session.append_chunk(0, None, None, b"ABC").await.unwrap();
        let outcome = session.append_chunk(3, None, None, b"DEF").await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Completed);
        assert_eq!(fs::read(&target).await.unwrap(), b"ABCDEF");
    }

    #[tokio::test]
    async fn chunk_outside_declared_range_is_rejected() {
        let dir = scratch();
        let target = dir.path().join("bounded.txt");
        let mut session = UploadSession::create(dir.path()).await.unwrap();

        // An offset near u64::MAX must not wrap around.
        let err = session
            .append_chunk(u64::MAX, Some(10), Some(target.clone()), b"ABCDE")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::OutOfRange { .. }));

        // A chunk running past the declared end is rejected too.
        let err = session
            .append_chunk(8, None, None, b"ABCDE")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::OutOfRange { .. }));

        // Nothing was persisted and the session remains usable.
        assert_eq!(session.current_offset(), 0);
        session.append_chunk(0, None, None, b"ABCDE").await.unwrap();
        let outcome = session.append_chunk(5, None, None, b"FGHIJ").await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Completed);
        assert_eq!(fs::read(&target).await.unwrap(), b"ABCDEFGHIJ");
    }

    #[tokio::test]
    async fn first_chunk_requires_length_and_name() {
        let dir = scratch();
        let mut session = UploadSession::create(dir.path()).await.unwrap();

        let err = session
            .append_chunk(0, None, Some(dir.path().join("x")), b"AB")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::MissingLength));

        let err = session
            .append_chunk(0, Some(4), None, b"AB")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::MissingTarget));
    }

    #[tokio::test]
    async fn whole_file_write_and_revert() {
        let dir = scratch();
        let target = dir.path().join("whole.bin");
        let mut session = UploadSession::create(dir.path()).await.unwrap();

        let mut writer = session.begin_whole(target.clone()).await.unwrap();
        writer.write(b"hello ").await.unwrap();
        writer.write(b"world").await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 11);
        assert_eq!(fs::read(&target).await.unwrap(), b"hello world");

        session.revert().await.unwrap();
        assert!(!target.exists());
        // Reverting again is fine.
        session.revert().await.unwrap();
    }

    #[tokio::test]
    async fn revert_without_target_succeeds() {
        let dir = scratch();
        let mut session = UploadSession::create(dir.path()).await.unwrap();
        session.revert().await.unwrap();
    }

    #[tokio::test]
    async fn close_schedules_scratch_deletion_once() {
        let dir = scratch();
        let (sweeper, handle) = Sweeper::spawn(8);
        let mut session = UploadSession::create(dir.path()).await.unwrap();
        let scratch_dir = dir.path().join(session.id().to_string());
        assert!(scratch_dir.exists());

        session.close(&sweeper);
        session.close(&sweeper);
        drop(sweeper);
        handle.await.unwrap();
        assert!(!scratch_dir.exists());
    }
}
