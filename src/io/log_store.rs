//! Append-only frame log backing the file parameter store.
//!
//! The file is a bare concatenation of frames (see [`super::codec`]) with no
//! header and no end marker. Writers append whole entries and sync before
//! returning. Readers keep their own cursor and only replay the bytes added
//! since their last read; frames of entries that are not complete yet are
//! carried over to the next read.

use std::io::{self as stdio, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs_err::{self as fs, File, OpenOptions};

use super::codec::{DataChunk, DataEntry, frame_capacity};
use super::reassembly::{Reassembled, reassemble};
use crate::error::{Result, StoreError};

/// Snapshot of the reader's progress through the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    /// Offset of the first byte not yet consumed by the reader.
    pub read_offset: u64,
    /// Frames waiting for the rest of their entry.
    pub pending_frames: usize,
    /// Start of the frame the last read found cut off, if any.
    pub truncated_at: Option<u64>,
}

/// Entries completed by one read pass.
#[derive(Debug, Default)]
pub struct LogRead {
    pub entries: Vec<DataEntry>,
    /// Set when the pass stopped at a frame cut off at the end of the file.
    /// The cursor stays at that frame so a later read can pick it up.
    pub truncated: Option<StoreError>,
}

/// A frame log with independent append and read cursors.
pub struct LogStore {
    path: PathBuf,
    frame_size: usize,
    writer: Option<File>,
    reader: File,
    read_offset: u64,
    pending: Vec<DataChunk>,
    truncated_at: Option<u64>,
}

impl LogStore {
    /// Opens the log at `path`, creating parent directories and the file itself
    /// when they do not exist yet.
    pub fn open<P: AsRef<Path>>(path: P, frame_size: usize) -> Result<Self> {
        frame_capacity(frame_size)?;
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use fs_err::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let writer = options.open(&path)?;
        let reader = OpenOptions::new().read(true).open(&path)?;

        tracing::debug!(path = %path.display(), frame_size, "opened parameter log");
        Ok(Self::with_handles(path, frame_size, Some(writer), reader))
    }

    /// Opens an existing log for reading only. Nothing is created and
    /// [`LogStore::write`] fails.
    pub fn open_read_only<P: AsRef<Path>>(path: P, frame_size: usize) -> Result<Self> {
        frame_capacity(frame_size)?;
        let path = path.as_ref().to_path_buf();
        let reader = OpenOptions::new().read(true).open(&path)?;
        tracing::debug!(path = %path.display(), frame_size, "opened parameter log read-only");
        Ok(Self::with_handles(path, frame_size, None, reader))
    }

    fn with_handles(path: PathBuf, frame_size: usize, writer: Option<File>, reader: File) -> Self {
        Self {
            path,
            frame_size,
            writer,
            reader,
            read_offset: 0,
            pending: Vec::new(),
            truncated_at: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[must_use]
    pub fn stats(&self) -> LogStats {
        LogStats {
            read_offset: self.read_offset,
            pending_frames: self.pending.len(),
            truncated_at: self.truncated_at,
        }
    }

    /// Appends `entry` and syncs the file before returning.
    ///
    /// All frames of the entry go out in one write. If the write fails part
    /// way, the frames already on disk stay incomplete and are never surfaced
    /// by a reader.
    pub fn write(&mut self, entry: &DataEntry) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(StoreError::Io {
                source: stdio::Error::new(ErrorKind::PermissionDenied, "log is open read-only"),
                path: Some(self.path.clone()),
            });
        };
        let chunks = entry.split(self.frame_size)?;
        let mut buf = Vec::with_capacity(chunks.iter().map(DataChunk::encoded_len).sum());
        for chunk in &chunks {
            chunk.encode_into(&mut buf)?;
        }
        writer.write_all(&buf)?;
        writer.sync_all()?;
        Ok(())
    }

    /// Returns the entries completed by bytes appended since the last read.
    ///
    /// A frame that is cut off at the end of the file ends the pass: the
    /// cursor stays at the start of that frame and [`LogRead::truncated`]
    /// carries a [`StoreError::TruncatedFrame`]. Entries completed by the
    /// frames before it are still returned.
    pub fn read(&mut self) -> Result<LogRead> {
        self.reader.seek(SeekFrom::Start(self.read_offset))?;
        let mut delta = Vec::new();
        self.reader.read_to_end(&mut delta)?;

        let mut cursor = Cursor::new(delta.as_slice());
        let mut frames = Vec::new();
        let failure = loop {
            let start = cursor.position();
            match DataChunk::read_from(&mut cursor, self.read_offset + start) {
                Ok(Some(chunk)) => frames.push(chunk),
                Ok(None) => break None,
                Err(err) => break Some((start, err)),
            }
        };

        let consumed = failure.as_ref().map_or(cursor.position(), |(start, _)| *start);
        self.read_offset += consumed;
        self.reader.seek(SeekFrom::Start(self.read_offset))?;
        self.pending.extend(frames);

        let truncated = match failure {
            Some((_, err)) if err.is_retryable() => {
                tracing::debug!(
                    path = %self.path.display(),
                    offset = self.read_offset,
                    "log ends inside a frame"
                );
                self.truncated_at = Some(self.read_offset);
                Some(err)
            }
            Some((_, err)) => {
                tracing::debug!(
                    path = %self.path.display(),
                    offset = self.read_offset,
                    %err,
                    "stopped reading at damaged frame"
                );
                return Err(err);
            }
            None => {
                self.truncated_at = None;
                None
            }
        };

        let Reassembled { entries, remaining } = reassemble(std::mem::take(&mut self.pending));
        self.pending = remaining;
        Ok(LogRead { entries, truncated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_FRAME_SIZE;
    use crate::error::StoreError;
    use crate::io::codec::EntryType;
    use tempfile::tempdir;

    fn entry(id: u8, payload_len: usize) -> DataEntry {
        DataEntry::new(EntryType::Parameters, vec![id; 16], vec![id; payload_len])
    }

    fn encoded_frames(entry: &DataEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for chunk in entry.split(DEFAULT_FRAME_SIZE)? {
            chunk.encode_into(&mut buf)?;
        }
        Ok(buf)
    }

    fn append_raw(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    #[test]
    fn creates_missing_directories() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("deeper").join("params.log");
        let _log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        assert!(path.exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn new_log_is_private_to_owner() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let _log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        let mode = fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o077, 0);
        Ok(())
    }

    #[test]
    fn rejects_frames_too_small_for_data() -> Result<()> {
        let dir = tempdir()?;
        let result = LogStore::open(dir.path().join("params.log"), 10);
        assert!(matches!(result, Err(StoreError::InvalidConfig { .. })));
        Ok(())
    }

    #[test]
    fn write_then_read_returns_entries_in_log_order() -> Result<()> {
        let dir = tempdir()?;
        let mut log = LogStore::open(dir.path().join("params.log"), DEFAULT_FRAME_SIZE)?;
        let a = entry(1, 300);
        let b = entry(2, 5);
        log.write(&a)?;
        log.write(&b)?;
        assert_eq!(log.read()?.entries, vec![a, b]);
        Ok(())
    }

    #[test]
    fn reads_only_the_delta() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let mut log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        let a = entry(1, 50);
        log.write(&a)?;
        assert_eq!(log.read()?.entries, vec![a]);
        assert!(log.read()?.entries.is_empty());
        assert_eq!(log.stats().read_offset, fs::metadata(&path)?.len());

        let b = entry(2, 50);
        log.write(&b)?;
        assert_eq!(log.read()?.entries, vec![b]);
        Ok(())
    }

    #[test]
    fn independent_instances_share_the_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let mut writer = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        let mut reader = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        let a = entry(7, 90);
        writer.write(&a)?;
        assert_eq!(reader.read()?.entries, vec![a.clone()]);
        assert_eq!(writer.read()?.entries, vec![a]);
        Ok(())
    }

    #[test]
    fn truncated_tail_rewinds_and_recovers() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let mut log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        let a = entry(1, 60);
        log.write(&a)?;
        let boundary = fs::metadata(&path)?.len();

        let b = entry(2, 100);
        let tail = encoded_frames(&b)?;
        append_raw(&path, &tail[..10])?;

        let read = log.read()?;
        assert_eq!(read.entries, vec![a]);
        let err = read.truncated.expect("tail is cut off");
        assert!(matches!(err, StoreError::TruncatedFrame { offset } if offset == boundary));
        assert!(err.is_retryable());
        assert_eq!(log.stats().read_offset, boundary);
        assert_eq!(log.stats().truncated_at, Some(boundary));

        append_raw(&path, &tail[10..])?;
        let read = log.read()?;
        assert_eq!(read.entries, vec![b]);
        assert!(read.truncated.is_none());
        assert_eq!(log.stats().pending_frames, 0);
        assert_eq!(log.stats().truncated_at, None);
        Ok(())
    }

    #[test]
    fn entries_completed_before_a_cut_frame_are_returned() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let a = entry(1, 100);
        let b = entry(2, 100);
        let first = encoded_frames(&a)?;
        let second = encoded_frames(&b)?;
        assert!(second.len() > DEFAULT_FRAME_SIZE);

        // A, one whole frame of B and three bytes of the next one.
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..DEFAULT_FRAME_SIZE + 3]);
        fs::write(&path, &bytes)?;

        let mut log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        let read = log.read()?;
        assert_eq!(read.entries, vec![a]);
        let cut = (first.len() + DEFAULT_FRAME_SIZE) as u64;
        assert!(matches!(
            read.truncated,
            Some(StoreError::TruncatedFrame { offset }) if offset == cut
        ));
        assert_eq!(log.stats().read_offset, cut);
        assert_eq!(log.stats().pending_frames, 1);

        append_raw(&path, &second[DEFAULT_FRAME_SIZE + 3..])?;
        assert_eq!(log.read()?.entries, vec![b]);
        Ok(())
    }

    #[test]
    fn read_only_open_does_not_create_the_log() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("missing").join("params.log");
        let result = LogStore::open_read_only(&path, DEFAULT_FRAME_SIZE);
        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert!(!path.exists());
        assert!(!dir.path().join("missing").exists());
        Ok(())
    }

    #[test]
    fn read_only_log_reads_but_refuses_writes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let a = entry(1, 50);
        LogStore::open(&path, DEFAULT_FRAME_SIZE)?.write(&a)?;
        let len = fs::metadata(&path)?.len();

        let mut log = LogStore::open_read_only(&path, DEFAULT_FRAME_SIZE)?;
        assert_eq!(log.read()?.entries, vec![a]);
        let err = log.write(&entry(2, 5)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Io { ref source, .. } if source.kind() == ErrorKind::PermissionDenied
        ));
        assert_eq!(fs::metadata(&path)?.len(), len);
        Ok(())
    }

    #[test]
    fn tail_ending_on_frame_boundary_is_not_an_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let mut log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        let b = entry(3, 100);
        let chunks = b.split(DEFAULT_FRAME_SIZE)?;
        assert!(chunks.len() > 1);

        let mut first = Vec::new();
        chunks[0].encode_into(&mut first)?;
        append_raw(&path, &first)?;
        assert!(log.read()?.entries.is_empty());
        assert_eq!(log.stats().pending_frames, 1);

        let mut rest = Vec::new();
        for chunk in &chunks[1..] {
            chunk.encode_into(&mut rest)?;
        }
        append_raw(&path, &rest)?;
        assert_eq!(log.read()?.entries, vec![b]);
        Ok(())
    }

    #[test]
    fn unknown_frame_version_fails_the_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let mut log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        append_raw(&path, &[0xFF, 0, 0])?;
        let err = log.read().unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { found: 0xFF, .. }));
        assert_eq!(log.stats().read_offset, 0);
        Ok(())
    }

    #[test]
    fn reopened_log_replays_everything() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("params.log");
        let entries: Vec<DataEntry> = (0..5).map(|i| entry(i, usize::from(i) * 40)).collect();
        {
            let mut log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
            for e in &entries {
                log.write(e)?;
            }
        }
        let mut log = LogStore::open(&path, DEFAULT_FRAME_SIZE)?;
        assert_eq!(log.read()?.entries, entries);
        Ok(())
    }
}
