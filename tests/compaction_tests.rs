// Compaction tests for CaskDb
// These tests verify the compaction ordering contract, space reclamation,
// and that live data survives the file swap.

use caskdb::{Result, Storage};
use tempfile::TempDir;

/// The documented ordering contract: one record per key, first-appearance
/// order, each holding the last-written value.
#[test]
fn test_compaction_first_appearance_order_latest_value() {
    let dir = TempDir::new().unwrap();
    let mut storage = Storage::open(dir.path()).unwrap();

    storage.put("k1", &"v1.0".to_string()).unwrap();
    storage.put("k2", &"v2.0".to_string()).unwrap();
    storage.put("k2", &"v2.1".to_string()).unwrap();
    storage.put("k1", &"v1.1".to_string()).unwrap();

    storage.compact().unwrap();

    let entries: Vec<_> = storage
        .records::<String>()
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap();
    let observed: Vec<_> = entries
        .iter()
        .map(|e| (e.meta.key.as_str(), e.data.as_str()))
        .collect();
    assert_eq!(observed, vec![("k1", "v1.1"), ("k2", "v2.1")]);
}

/// Every key still resolves to its chronologically last value
#[test]
fn test_compaction_preserves_last_write_wins() {
    let dir = TempDir::new().unwrap();
    let mut storage = Storage::open(dir.path()).unwrap();

    for round in 0..5 {
        for key in 0..20 {
            storage
                .put(&format!("key{}", key), &format!("value{}-{}", key, round))
                .unwrap();
        }
    }

    storage.compact().unwrap();

    assert_eq!(storage.len(), 20);
    for key in 0..20 {
        assert_eq!(
            storage
                .get::<String>(&format!("key{}", key))
                .unwrap()
                .unwrap()
                .data,
            format!("value{}-4", key)
        );
    }
}

/// Overwritten keys shrink the log; unique keys leave it unchanged
#[test]
fn test_compaction_size_behavior() {
    let dir = TempDir::new().unwrap();
    let mut storage = Storage::open(dir.path()).unwrap();

    for i in 0..10 {
        storage.put(&format!("unique{}", i), &i).unwrap();
    }
    let unique_size = storage.log_size().unwrap();
    storage.compact().unwrap();
    assert_eq!(storage.log_size().unwrap(), unique_size);

    for i in 0..100 {
        storage.put("hot", &i).unwrap();
    }
    let bloated = storage.log_size().unwrap();
    storage.compact().unwrap();
    assert!(storage.log_size().unwrap() < bloated);
}

/// Compaction reports elapsed wall-clock milliseconds
#[test]
fn test_compaction_reports_elapsed() {
    let dir = TempDir::new().unwrap();
    let mut storage = Storage::open(dir.path()).unwrap();
    for i in 0..1000 {
        storage.put(&format!("k{}", i % 10), &i).unwrap();
    }

    // Just shape: wall-clock, bounded by a generous ceiling
    let elapsed_ms = storage.compact().unwrap();
    assert!(elapsed_ms < 60_000);
}

/// The engine stays fully usable after a compaction swapped the file
#[test]
fn test_compaction_then_further_writes() {
    let dir = TempDir::new().unwrap();
    let mut storage = Storage::open(dir.path()).unwrap();

    storage.put("a", &1).unwrap();
    storage.put("a", &2).unwrap();
    storage.compact().unwrap();

    storage.put("b", &3).unwrap();
    storage.put("a", &4).unwrap();

    assert_eq!(storage.get::<i32>("a").unwrap().unwrap().data, 4);
    assert_eq!(storage.get::<i32>("b").unwrap().unwrap().data, 3);

    storage.compact().unwrap();
    assert_eq!(storage.get::<i32>("a").unwrap().unwrap().data, 4);
    assert_eq!(storage.get::<i32>("b").unwrap().unwrap().data, 3);
}

/// A compacted directory reopens with the compacted offsets
#[test]
fn test_compaction_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let mut storage = Storage::open(dir.path()).unwrap();
        for i in 0..50 {
            storage.put("k", &i).unwrap();
        }
        storage.put("other", &"x".to_string()).unwrap();
        storage.compact().unwrap();
        storage.close().unwrap();
    }

    let storage = Storage::open(dir.path()).unwrap();
    assert_eq!(storage.len(), 2);
    assert_eq!(storage.get::<i32>("k").unwrap().unwrap().data, 49);
    assert_eq!(storage.get::<String>("other").unwrap().unwrap().data, "x");
}

/// Compacting an empty directory is a no-op
#[test]
fn test_compaction_empty_storage() {
    let dir = TempDir::new().unwrap();
    let mut storage = Storage::open(dir.path()).unwrap();

    storage.compact().unwrap();
    assert!(storage.is_empty());
    assert_eq!(storage.log_size().unwrap(), 0);
}
