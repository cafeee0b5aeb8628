//! Tests for compaction and clear
//!
//! These tests verify:
//! - Compaction shrinks the file and keeps every live entry
//! - The threshold decides non-forced compaction
//! - Clear empties the file, repeatedly

use dawnkv::journal::HEADER_SIZE;
use dawnkv::{CompactionOutcome, Config, Engine, SyncStrategy};

use super::{key, open, setup_temp_db};

#[test]
fn test_compact_shrinks_file() {
    let (_temp, path) = setup_temp_db();
    let db = open::<String>(&path);

    for round in 0..20 {
        for i in 0..10 {
            db.set(&format!("k{}", i), format!("round {}", round)).unwrap();
        }
    }
    db.delete(&key("k0")).unwrap();
    db.flush().unwrap();
    let size_before = db.bytesize().unwrap();

    let outcome = db.compact(true).unwrap();

    match outcome {
        CompactionOutcome::Compacted {
            records_before,
            records_after,
            bytes_before,
            bytes_after,
        } => {
            assert_eq!(records_before, 201);
            assert_eq!(records_after, 9);
            assert_eq!(bytes_before, size_before);
            assert!(bytes_after < bytes_before);
        }
        other => panic!("expected compaction, got {:?}", other),
    }
    assert_eq!(db.logsize().unwrap(), 9);
    assert_eq!(db.get(&key("k5")).unwrap(), Some("round 19".to_string()));
    assert_eq!(db.get(&key("k0")).unwrap(), None);

    drop(db);
    let db = open::<String>(&path);
    assert_eq!(db.len(), 9);
    assert_eq!(db.get(&key("k9")).unwrap(), Some("round 19".to_string()));
}

#[test]
fn test_compact_includes_unflushed_writes() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);

    db.set(&key("buffered"), 1).unwrap();
    db.compact(true).unwrap();

    let other = open::<i64>(&path);
    assert_eq!(other.get(&key("buffered")).unwrap(), Some(1));
}

#[test]
fn test_compact_skips_fresh_log() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);
    for i in 0..10 {
        db.set(&format!("k{}", i), i).unwrap();
    }

    let outcome = db.compact(false).unwrap();
    assert_eq!(
        outcome,
        CompactionOutcome::Skipped {
            records: 10,
            live: 10
        }
    );
}

#[test]
fn test_compact_respects_threshold() {
    let (_temp, path) = setup_temp_db();
    let config = Config::builder()
        .sync_strategy(SyncStrategy::OsBuffered)
        .compaction_threshold(0.25)
        .build();
    let db: Engine<String, i64> = Engine::builder(&path).config(config).open().unwrap();

    for i in 0..4 {
        db.set(&format!("k{}", i), i).unwrap();
    }
    db.set(&key("k0"), 10).unwrap();
    db.set(&key("k1"), 11).unwrap();

    // 2 of 6 records are stale
    assert!(matches!(
        db.compact(false).unwrap(),
        CompactionOutcome::Compacted { records_after: 4, .. }
    ));
}

#[test]
fn test_compact_empty_database() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);

    db.compact(true).unwrap();
    assert_eq!(db.bytesize().unwrap(), HEADER_SIZE);
    assert!(db.is_empty());
}

#[test]
fn test_clear() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);
    db.set_flush(&key("a"), 1).unwrap();
    db.set(&key("b"), 2).unwrap();

    db.clear().unwrap();

    assert!(db.is_empty());
    assert_eq!(db.bytesize().unwrap(), HEADER_SIZE);
    assert_eq!(db.logsize().unwrap(), 0);

    drop(db);
    let db = open::<i64>(&path);
    assert!(db.is_empty());
}

#[test]
fn test_clear_many_times() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);

    for i in 0..1000 {
        db.set(&key("k"), i).unwrap();
        db.clear().unwrap();
    }

    assert!(db.is_empty());
    assert_eq!(db.bytesize().unwrap(), HEADER_SIZE);
}
