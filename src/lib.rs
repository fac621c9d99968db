//! # CaskDb - An Embedded Log-Structured Key-Value Storage Engine
//!
//! CaskDb is a persistent key-value storage engine built on the Bitcask
//! design: every value is appended to a single on-disk log, and an in-memory
//! index maps each key to the offset of its most recent record.
//!
//! ## Architecture
//!
//! The storage engine consists of several key components:
//!
//! - **Segment Log**: Append-only file of framed, integrity-checked records
//! - **Key Index**: In-memory map from key to latest record offset, rebuilt
//!   by a full log scan at open time
//! - **Compactor**: Rewrites the log keeping one record per key and swaps
//!   the new file in atomically
//! - **Serializer / Checksum**: Pluggable value encoding and digest
//!   strategies supplied by the caller
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use caskdb::Storage;
//!
//! # fn main() -> Result<(), caskdb::Error> {
//! // Open or create a storage directory
//! let mut storage = Storage::open("./db")?;
//!
//! // Write operations
//! storage.put("user:1", &"Alice".to_string())?;
//! storage.put("user:2", &"Bob".to_string())?;
//!
//! // Read operations
//! if let Some(entry) = storage.get::<String>("user:1")? {
//!     println!("Found: {} (written at {})", entry.data, entry.meta.timestamp);
//! }
//!
//! // Reclaim space held by overwritten values
//! let elapsed_ms = storage.compact()?;
//! println!("Compaction took {}ms", elapsed_ms);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod checksum;
pub mod compactor;
pub mod config;
pub mod error;
pub mod iter;
pub mod keys;
pub mod segment;
pub mod serializer;

// Re-exports
pub use checksum::{Checksum, Crc32};
pub use config::Options;
pub use error::{Error, Result};
pub use iter::{RecordStream, Records};
pub use keys::KeyIndex;
pub use segment::SegmentLog;
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata stored alongside every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Digest of the record's serialized value bytes.
    pub checksum: u32,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// The key this record was written under.
    pub key: String,
}

/// A decoded value together with its record metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    /// The record metadata.
    pub meta: Meta,
    /// The decoded value.
    pub data: T,
}

/// The storage engine facade.
///
/// Composes the segment log, key index, compactor, and the caller-supplied
/// serializer and checksum strategies. One instance assumes a single logical
/// writer/reader: the engine performs no internal locking, and [`compact`]
/// must not run concurrently with [`put`]/[`get`] on the same instance
/// because it swaps the log file out underneath the live handle.
///
/// [`put`]: Storage::put
/// [`get`]: Storage::get
/// [`compact`]: Storage::compact
pub struct Storage<S: Serializer = JsonSerializer, C: Checksum = Crc32> {
    /// Storage directory path
    path: PathBuf,
    /// Configuration options
    options: Options,
    /// The append-only data log
    log: SegmentLog,
    /// Key -> latest record offset, rebuilt from the log
    index: KeyIndex,
    /// Value and metadata encoding strategy
    serializer: S,
    /// Integrity digest strategy
    checksum: C,
    /// Appends since open or the last compaction, for the automatic
    /// compaction trigger
    writes_since_compact: u64,
}

impl Storage<JsonSerializer, Crc32> {
    /// Opens a storage directory with default options, JSON serialization,
    /// and CRC32 checksums.
    ///
    /// The directory is created if missing; an already existing directory is
    /// fine and prior data in it is resumed.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        Self::open_with(directory, Options::default(), JsonSerializer, Crc32)
    }
}

impl<S: Serializer, C: Checksum> Storage<S, C> {
    /// Opens a storage directory with explicit options and strategies.
    ///
    /// Opens (or creates) the log file named by `options.log_file_name`
    /// inside `directory` and performs a full index rebuild by scanning it
    /// from the start.
    pub fn open_with<P: AsRef<Path>>(
        directory: P,
        options: Options,
        serializer: S,
        checksum: C,
    ) -> Result<Self> {
        let path = directory.as_ref().to_path_buf();

        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(Error::Io(e)),
        }

        let log = SegmentLog::open_with(path.join(&options.log_file_name), options.sync_writes)?;

        let mut storage = Self {
            path,
            options,
            log,
            index: KeyIndex::new(),
            serializer,
            checksum,
            writes_since_compact: 0,
        };
        storage.rebuild_index()?;
        Ok(storage)
    }

    /// Storage directory this engine was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct keys currently indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no key is currently indexed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Size of the data log in bytes.
    pub fn log_size(&self) -> Result<u64> {
        self.log.stat()
    }

    /// Writes a value under `key`.
    ///
    /// Appends a framed record holding the serialized value and its metadata
    /// (checksum, timestamp, key), then points the index at the new record.
    /// If the append fails the index is left unchanged; any partially
    /// flushed bytes are unreachable dead space, not referenced by any key.
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let offset = self.log.position();
        let data = self.serializer.to_bytes(value)?;

        let meta = Meta {
            checksum: self.checksum.digest(&data),
            timestamp: unix_millis(),
            key: key.to_string(),
        };
        let metadata = self.serializer.to_bytes(&meta)?;

        let written = self.log.write(&data, &metadata);
        if written == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("no bytes appended to segment log for key {:?}", key),
            )));
        }
        self.index.insert(meta.key, offset);

        self.writes_since_compact += 1;
        if let Some(threshold) = self.options.auto_compact_threshold {
            if self.writes_since_compact >= threshold {
                self.compact()?;
            }
        }
        Ok(())
    }

    /// Reads the most recent value written under `key`.
    ///
    /// Returns `Ok(None)` for a key never written. The stored checksum is
    /// verified against one recomputed over the raw value bytes; on mismatch
    /// the record is treated as unreadable and `Ok(None)` is returned rather
    /// than an error — reads fail open on corruption but still propagate
    /// genuine I/O failures.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Entry<T>>> {
        let offset = match self.index.get(key) {
            Some(offset) => offset,
            None => return Ok(None),
        };

        let segment = self.log.read(offset)?;
        let meta: Meta = self.serializer.from_bytes(&segment.metadata)?;

        let actual = self.checksum.digest(&segment.data);
        if actual != meta.checksum {
            log::error!(
                "checksum mismatch for key {:?} at offset {}: {}",
                key,
                offset,
                Error::ChecksumMismatch { expected: meta.checksum, actual }
            );
            return Ok(None);
        }

        let data = self.serializer.from_bytes(&segment.data)?;
        Ok(Some(Entry { meta, data }))
    }

    /// Rewrites the log keeping only the most recent record per key, then
    /// rebuilds the index against the new (smaller) file.
    ///
    /// Compacted output contains one record per key in first-appearance
    /// order, each holding the last-written value. Returns the wall-clock
    /// duration in milliseconds.
    pub fn compact(&mut self) -> Result<u64> {
        let serializer = &self.serializer;
        let elapsed = compactor::compact(&mut self.log, |segment| {
            let meta: Meta = serializer.from_bytes(&segment.metadata)?;
            Ok(meta.key)
        })?;

        self.rebuild_index()?;
        self.writes_since_compact = 0;
        Ok(elapsed.as_millis() as u64)
    }

    /// Lazily iterates every record in the log in on-disk order.
    ///
    /// Scans the raw log rather than the index, so a key written multiple
    /// times yields multiple entries unless a compaction ran first. Each
    /// call restarts from the beginning of the log.
    pub fn records<T: DeserializeOwned>(&self) -> Result<Records<'_, S, T>> {
        Records::new(&self.log, &self.serializer)
    }

    /// Push-based equivalent of [`records`](Storage::records).
    ///
    /// A producer thread scans the log through its own independent file
    /// handle and sends decoded entries through a bounded channel of
    /// capacity `options.stream_buffer`, so it never runs more than that
    /// many records ahead of the consumer. Dropping the stream stops the
    /// producer. Must not overlap a [`compact`](Storage::compact) on the
    /// same directory.
    pub fn stream<T>(&self) -> Result<RecordStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
        S: Clone + Send + 'static,
    {
        RecordStream::spawn(
            self.log.path().to_path_buf(),
            self.serializer.clone(),
            self.options.stream_buffer,
        )
    }

    /// Iterates indexed keys in the order they were first observed during
    /// the last rebuild.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.iter().map(|(key, _)| key)
    }

    /// Flushes and closes the underlying log.
    pub fn close(self) -> Result<()> {
        self.log.close()
    }

    fn rebuild_index(&mut self) -> Result<()> {
        let serializer = &self.serializer;
        self.index.rebuild(&self.log, |segment| {
            let meta: Meta = serializer.from_bytes(&segment.metadata)?;
            Ok(meta.key)
        })
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
