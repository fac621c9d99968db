//! Append-only segment log.
//!
//! The segment log is the single source of truth for the engine: every value
//! ever written lives in one on-disk file as a self-describing, integrity
//! checked record frame (see [`record`]). The log supports appending frames
//! at the end and positional random-access reads anywhere before it.
//!
//! ## Crash behavior
//!
//! The file is opened in append mode and previously written bytes are never
//! mutated in place, so a crash leaves at worst one truncated trailing
//! record. The trailer sentinel check in [`SegmentLog::read`] detects it on
//! the next startup scan.

pub mod record;

pub use record::{Segment, HEADER_SIZE, TRAILER, TRAILER_SIZE};

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An append-only log file with positional reads.
pub struct SegmentLog {
    /// Path to the log file
    path: PathBuf,
    /// Open file handle (append + read)
    file: File,
    /// Current append position; equals the file length after every
    /// successful write
    position: u64,
    /// Sync each append to disk before reporting it written
    sync_writes: bool,
}

impl SegmentLog {
    /// Open or create the log file at `path`.
    ///
    /// A pre-existing, non-empty file is resumed directly: the append
    /// position is initialized to its current size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, false)
    }

    /// Open or create the log file, syncing each append when `sync_writes`
    /// is set.
    pub fn open_with<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open_file(&path)?;
        let position = file.metadata()?.len();

        Ok(Self { path, file, position, sync_writes })
    }

    fn open_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(Error::Io)
    }

    /// Current append position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the underlying file.
    pub fn stat(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Frame `(data, metadata)` into a record and append it.
    ///
    /// Returns the number of bytes appended. This path deliberately does not
    /// return a `Result`: an OS write failure is logged and reported as `0`
    /// bytes written, and the append position does not advance. Callers must
    /// treat `0` as "nothing durably appended" and must not index anything
    /// on that basis.
    pub fn write(&mut self, data: &[u8], metadata: &[u8]) -> u64 {
        let frame = record::encode(data, metadata);

        if let Err(e) = (&self.file).write_all(&frame) {
            log::error!(
                "error while appending {} bytes to segment log {:?}: {}",
                frame.len(),
                self.path,
                e
            );
            return 0;
        }

        if self.sync_writes {
            if let Err(e) = self.file.sync_data() {
                log::error!("error while syncing segment log {:?}: {}", self.path, e);
                return 0;
            }
        }

        let written = frame.len() as u64;
        self.position += written;
        written
    }

    /// Read the record starting at `offset`.
    ///
    /// Fails with [`Error::Corruption`] if the record is truncated or its
    /// trailer sentinel is not `[0xC0, 0x80]`.
    pub fn read(&self, offset: u64) -> Result<Segment> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; HEADER_SIZE];
        read_fully(&mut file, &mut header, offset, "record header")?;
        let (data_len, metadata_len) = record::decode_header(&header);

        // Validate the claimed lengths against the file before allocating:
        // a garbage header must not trigger a multi-gigabyte read.
        let body_len = data_len as u64 + metadata_len as u64 + TRAILER_SIZE as u64;
        if offset + HEADER_SIZE as u64 + body_len > self.stat()? {
            return Err(Error::corruption(format!(
                "record at offset {} claims {} body bytes past end of file",
                offset, body_len
            )));
        }

        let mut body = vec![0u8; body_len as usize];
        read_fully(&mut file, &mut body, offset, "record body")?;

        record::decode_body(body, data_len, metadata_len, offset)
    }

    /// Sequentially scan all records from offset 0 to the current end of
    /// file, yielding each record with its starting offset.
    ///
    /// The end of file is snapshotted when the scan is created.
    pub fn scan(&self) -> Result<Scan<'_>> {
        let end = self.stat()?;
        Ok(Scan { log: self, position: 0, end, done: false })
    }

    /// Close and reopen the same path.
    ///
    /// Used after compaction swaps a new file in under the same name. The
    /// replacement file is opened first, so a failed reopen leaves the
    /// existing handle untouched.
    pub fn refresh(&mut self) -> Result<()> {
        let file = Self::open_file(&self.path)?;
        let position = file.metadata()?.len();

        // Replacing the handle drops (closes) the previous one.
        self.file = file;
        self.position = position;
        Ok(())
    }

    /// Flush file state to disk and close the log.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Read exactly `buf.len()` bytes, reporting a premature end of file as
/// corruption of the record at `offset`.
fn read_fully(file: &mut &File, buf: &mut [u8], offset: u64, what: &str) -> Result<()> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::corruption(format!("{} truncated at offset {}", what, offset))
        } else {
            Error::Io(e)
        }
    })
}

/// Sequential scanner over a [`SegmentLog`], created by [`SegmentLog::scan`].
///
/// Yields `(offset, segment)` pairs in on-disk order. The first error ends
/// the scan.
pub struct Scan<'a> {
    log: &'a SegmentLog,
    position: u64,
    end: u64,
    done: bool,
}

impl Scan<'_> {
    /// Offset the next read will start from.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<(u64, Segment)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.end {
            return None;
        }

        match self.log.read(self.position) {
            Ok(segment) => {
                let offset = self.position;
                self.position += segment.bytes_read;
                Some(Ok((offset, segment)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
