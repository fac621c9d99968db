//! In-memory key index and its insertion-ordered backing map.
//!
//! The key index maps every key to the byte offset of its most recent record
//! in the segment log. It is strictly a derived cache: the log is the source
//! of truth, and the index is rebuilt by a full sequential scan whenever a
//! storage directory is opened and after every compaction (offsets shift when
//! the log is rewritten).

use crate::error::{Error, Result};
use crate::segment::{Segment, SegmentLog};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// An associative map whose iteration order is the order keys were first
/// inserted.
///
/// Re-inserting an existing key updates its value in place without moving its
/// position, so the final order is always first-insertion order with the
/// latest values. This ordering is part of the contract: both index
/// enumeration and compaction output depend on it.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    order: Vec<K>,
    map: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> OrderedMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self { order: Vec::new(), map: HashMap::new() }
    }

    /// Inserts or updates a key, returning the previous value if any.
    ///
    /// A new key is appended at the end of the iteration order; an existing
    /// key keeps its position.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.map.insert(key.clone(), value) {
            Some(previous) => Some(previous),
            None => {
                self.order.push(key);
                None
            }
        }
    }

    /// Looks up a key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.get(key)
    }

    /// Whether the map holds the given key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.order.clear();
        self.map.clear();
    }

    /// Iterates entries in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order.iter().filter_map(move |k| self.map.get(k).map(|v| (k, v)))
    }

    /// Iterates values in first-insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<K: Eq + Hash + Clone, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mapping from key to the offset of its most recent record in the log.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    offsets: OrderedMap<String, u64>,
}

impl KeyIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Points `key` at the record starting at `offset`.
    pub fn insert(&mut self, key: String, offset: u64) {
        self.offsets.insert(key, offset);
    }

    /// Offset of the most recent record for `key`, if any.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no key is indexed.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Iterates `(key, offset)` pairs in the order keys were first observed
    /// during the last rebuild.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.offsets.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Discards the current contents and rebuilds the index by scanning the
    /// whole log.
    ///
    /// `key_of` extracts the key from each record, typically by deserializing
    /// its metadata. A corrupt or undecodable record terminates the scan with
    /// a warning, keeping everything indexed up to that point; this is the
    /// recovery path for a torn trailing append. Genuine I/O failures
    /// propagate.
    pub fn rebuild<F>(&mut self, log: &SegmentLog, mut key_of: F) -> Result<()>
    where
        F: FnMut(&Segment) -> Result<String>,
    {
        self.offsets.clear();

        for item in log.scan()? {
            let (offset, segment) = match item {
                Ok(entry) => entry,
                Err(Error::Corruption(msg)) => {
                    log::warn!("index rebuild stopped at corrupt record: {}", msg);
                    break;
                }
                Err(e) => return Err(e),
            };

            match key_of(&segment) {
                Ok(key) => self.insert(key, offset),
                Err(Error::Serialization(msg)) => {
                    log::warn!(
                        "index rebuild stopped at offset {}: undecodable metadata: {}",
                        offset,
                        msg
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ordered_map_first_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        map.insert("c", 3);

        let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_ordered_map_update_keeps_position() {
        let mut map = OrderedMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        assert_eq!(map.insert("b", 10), Some(1));

        let entries: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(entries, vec![("b", 10), ("a", 2)]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_ordered_map_lookup() {
        let mut map = OrderedMap::new();
        map.insert("key".to_string(), 7u64);

        assert_eq!(map.get("key"), Some(&7));
        assert_eq!(map.get("other"), None);
        assert!(map.contains_key("key"));
    }

    #[test]
    fn test_key_index_last_write_wins() {
        let mut index = KeyIndex::new();
        index.insert("k".to_string(), 0);
        index.insert("k".to_string(), 128);

        assert_eq!(index.get("k"), Some(128));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_rebuild_indexes_latest_offsets() {
        let dir = TempDir::new().unwrap();
        let mut log = SegmentLog::open(dir.path().join("data")).unwrap();

        log.write(b"v1", b"k1");
        let second = log.position();
        log.write(b"v2", b"k2");
        let third = log.position();
        log.write(b"v1-new", b"k1");

        let mut index = KeyIndex::new();
        index
            .rebuild(&log, |segment| {
                Ok(String::from_utf8_lossy(&segment.metadata).into_owned())
            })
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("k1"), Some(third));
        assert_eq!(index.get("k2"), Some(second));

        // First-observation order, not write recency
        let keys: Vec<_> = index.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["k1", "k2"]);
    }

    #[test]
    fn test_rebuild_stops_at_truncated_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");

        {
            let mut log = SegmentLog::open(&path).unwrap();
            log.write(b"v1", b"k1");
            log.write(b"v2", b"k2");
            log.close().unwrap();
        }

        // Chop off part of the final record, as a crashed append would
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let log = SegmentLog::open(&path).unwrap();
        let mut index = KeyIndex::new();
        index
            .rebuild(&log, |segment| {
                Ok(String::from_utf8_lossy(&segment.metadata).into_owned())
            })
            .unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("k1"), Some(0));
        assert_eq!(index.get("k2"), None);
    }
}
