//! Log compaction.
//!
//! Compaction reclaims the space held by superseded records: the whole log is
//! streamed once, the most recent record for each key is retained, and a new
//! log file atomically replaces the original. The algorithm is generic over
//! the key type and works against any [`SegmentLog`] plus a key-extraction
//! function, so it knows nothing about serialization.
//!
//! ## Ordering contract
//!
//! Retained records are written in first-appearance order of their keys, each
//! holding the last-written value. This falls out of the [`OrderedMap`]
//! retention structure and is observable through a post-compaction scan.

use crate::error::Result;
use crate::keys::OrderedMap;
use crate::segment::{Segment, SegmentLog};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Suffix appended to the log path for the replacement file while it is
/// being written.
const TMP_SUFFIX: &str = ".tmp";

fn tmp_path(log: &SegmentLog) -> std::path::PathBuf {
    let mut path = log.path().as_os_str().to_os_string();
    path.push(TMP_SUFFIX);
    path.into()
}

/// Rewrite `log` keeping only the most recent record per key.
///
/// `key_of` extracts the key from each record, typically by deserializing its
/// metadata. The replacement file is written under a temporary name, renamed
/// over the original path, and the live handle is refreshed so subsequent
/// operations transparently target the new file.
///
/// Must not run concurrently with reads or writes against the same log: the
/// file is swapped out underneath the handle. Returns the wall-clock duration
/// of the whole operation.
pub fn compact<K, F>(log: &mut SegmentLog, mut key_of: F) -> Result<Duration>
where
    K: Eq + Hash + Clone,
    F: FnMut(&Segment) -> Result<K>,
{
    let start = Instant::now();
    let before = log.stat()?;

    let mut retained: OrderedMap<K, Segment> = OrderedMap::new();
    for item in log.scan()? {
        let (_, segment) = item?;
        let key = key_of(&segment)?;
        retained.insert(key, segment);
    }

    let tmp_path = tmp_path(log);
    let mut replacement = SegmentLog::open(&tmp_path)?;
    for segment in retained.values() {
        let written = replacement.write(&segment.data, &segment.metadata);
        if written == 0 {
            // A swallowed append would silently drop a live record; abort
            // and leave the original log untouched.
            let _ = std::fs::remove_file(&tmp_path);
            return Err(crate::error::Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to append record to replacement log",
            )));
        }
    }
    let after = replacement.position();
    replacement.close()?;

    std::fs::rename(&tmp_path, log.path())?;
    log.refresh()?;

    let elapsed = start.elapsed();
    log::info!(
        "compacted {:?}: {} -> {} bytes, {} keys, {:?}",
        log.path(),
        before,
        after,
        retained.len(),
        elapsed
    );

    Ok(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key_from_metadata(segment: &Segment) -> Result<String> {
        Ok(String::from_utf8_lossy(&segment.metadata).into_owned())
    }

    #[test]
    fn test_compact_drops_superseded_records() {
        let dir = TempDir::new().unwrap();
        let mut log = SegmentLog::open(dir.path().join("data")).unwrap();

        log.write(b"v1.0", b"k1");
        log.write(b"v2.0", b"k2");
        log.write(b"v2.1", b"k2");
        log.write(b"v1.1", b"k1");
        let before = log.stat().unwrap();

        compact(&mut log, key_from_metadata).unwrap();

        assert!(log.stat().unwrap() < before);

        let records: Vec<_> = log
            .scan()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 2);

        // First-appearance order, latest values
        assert_eq!(&records[0].1.metadata[..], b"k1");
        assert_eq!(&records[0].1.data[..], b"v1.1");
        assert_eq!(&records[1].1.metadata[..], b"k2");
        assert_eq!(&records[1].1.data[..], b"v2.1");
    }

    #[test]
    fn test_compact_unique_keys_is_identity() {
        let dir = TempDir::new().unwrap();
        let mut log = SegmentLog::open(dir.path().join("data")).unwrap();

        log.write(b"v1", b"k1");
        log.write(b"v2", b"k2");
        let before = log.stat().unwrap();

        compact(&mut log, key_from_metadata).unwrap();

        assert_eq!(log.stat().unwrap(), before);
        let records: Vec<_> = log
            .scan()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0].1.data[..], b"v1");
        assert_eq!(&records[1].1.data[..], b"v2");
    }

    #[test]
    fn test_compact_empty_log() {
        let dir = TempDir::new().unwrap();
        let mut log = SegmentLog::open(dir.path().join("data")).unwrap();

        compact(&mut log, key_from_metadata).unwrap();
        assert_eq!(log.stat().unwrap(), 0);
    }

    #[test]
    fn test_compact_removes_temporary_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        let mut log = SegmentLog::open(&path).unwrap();

        log.write(b"v", b"k");
        compact(&mut log, key_from_metadata).unwrap();

        assert!(path.exists());
        assert!(!tmp_path(&log).exists());
    }

    #[test]
    fn test_handle_usable_after_compaction() {
        let dir = TempDir::new().unwrap();
        let mut log = SegmentLog::open(dir.path().join("data")).unwrap();

        log.write(b"old", b"k");
        log.write(b"new", b"k");
        compact(&mut log, key_from_metadata).unwrap();

        // Reads and writes keep working through the refreshed handle
        let segment = log.read(0).unwrap();
        assert_eq!(&segment.data[..], b"new");

        let offset = log.position();
        assert!(log.write(b"post-compact", b"k2") > 0);
        let appended = log.read(offset).unwrap();
        assert_eq!(&appended.data[..], b"post-compact");
    }
}
