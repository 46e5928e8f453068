// Integration tests for the durable segment store
//
// These verify the on-disk layout: one blob per segment index per session
// directory, plus an incrementally maintained metadata record.

use anyhow::Result;
use memoscribe::DiskSegmentStore;
use std::collections::BTreeMap;
use tempfile::TempDir;

#[test]
fn test_append_then_load_round_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DiskSegmentStore::new(temp_dir.path())?;

    store.append_segment("session-a", 0, &[1u8; 100])?;
    store.append_segment("session-a", 1, &[2u8; 200])?;

    let (segments, meta) = store.load("session-a")?.expect("session should exist");

    assert_eq!(segments.len(), 2);
    assert_eq!(segments.get(&0).unwrap().len(), 100);
    assert_eq!(segments.get(&1).unwrap().len(), 200);

    assert_eq!(meta.session_id, "session-a");
    assert_eq!(meta.segment_count, 2);
    assert_eq!(meta.total_size, 300);
    assert_eq!(meta.segment_indices, vec![0, 1]);

    Ok(())
}

#[test]
fn test_append_overwrite_adjusts_total_size() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DiskSegmentStore::new(temp_dir.path())?;

    store.append_segment("session-a", 0, &[0u8; 500])?;
    store.append_segment("session-a", 0, &[0u8; 50])?;

    let (_, meta) = store.load("session-a")?.unwrap();
    assert_eq!(meta.segment_count, 1);
    assert_eq!(meta.total_size, 50);

    Ok(())
}

#[test]
fn test_save_whole_session() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DiskSegmentStore::new(temp_dir.path())?;

    let mut segments = BTreeMap::new();
    segments.insert(0, vec![9u8; 64]);
    segments.insert(1, vec![8u8; 32]);
    segments.insert(2, vec![7u8; 16]);

    store.save("session-b", &segments)?;

    let (loaded, meta) = store.load("session-b")?.unwrap();
    assert_eq!(loaded, segments);
    assert_eq!(meta.segment_indices, vec![0, 1, 2]);
    assert_eq!(meta.total_size, 112);

    Ok(())
}

#[test]
fn test_save_does_not_forget_earlier_appends() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DiskSegmentStore::new(temp_dir.path())?;

    // Segment 0 was written at finalize time; a later flush of a trimmed
    // cache entry only carries segments 1 and 2.
    store.append_segment("session-c", 0, &[1u8; 10])?;

    let mut resident = BTreeMap::new();
    resident.insert(1, vec![2u8; 20]);
    resident.insert(2, vec![3u8; 30]);
    store.save("session-c", &resident)?;

    let (loaded, meta) = store.load("session-c")?.unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(meta.segment_indices, vec![0, 1, 2]);
    assert_eq!(meta.total_size, 60);

    Ok(())
}

#[test]
fn test_load_unknown_session_is_none() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DiskSegmentStore::new(temp_dir.path())?;

    assert!(store.load("nope")?.is_none());
    assert!(!store.session_exists("nope"));

    Ok(())
}

#[test]
fn test_delete_session_removes_directory() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = DiskSegmentStore::new(temp_dir.path())?;

    store.append_segment("session-d", 0, &[0u8; 8])?;
    assert!(store.session_exists("session-d"));

    store.delete_session("session-d")?;
    assert!(!store.session_exists("session-d"));
    assert!(store.load("session-d")?.is_none());

    Ok(())
}
