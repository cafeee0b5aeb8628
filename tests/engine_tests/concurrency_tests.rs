//! Tests for concurrent access from threads
//!
//! These tests verify:
//! - One engine shared between threads behind an `Arc`
//! - Separate engines per thread coordinating through the file lock
//! - Compaction running while other instances write

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::{key, open, setup_temp_db, Counter};

#[test]
fn test_shared_engine_increments() {
    let (_temp, path) = setup_temp_db();
    let db = Arc::new(open::<i64>(&path));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..1000 {
                    db.increment("counter").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.get(&key("counter")).unwrap(), Some(2000));
}

#[test]
fn test_shared_engine_plain_writes() {
    let (_temp, path) = setup_temp_db();
    let db = Arc::new(open::<usize>(&path));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..250 {
                    db.set(&format!("t{}-{}", t, i), i).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.len(), 1000);
    db.flush().unwrap();
    assert_eq!(open::<usize>(&path).len(), 1000);
}

#[test]
fn test_separate_engines_increment() {
    let (_temp, path) = setup_temp_db();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let db = open::<i64>(&path);
                for _ in 0..200 {
                    db.increment("counter").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let db = open::<i64>(&path);
    assert_eq!(db.get(&key("counter")).unwrap(), Some(600));
}

#[test]
fn test_background_compaction() {
    let (_temp, path) = setup_temp_db();
    let stop = Arc::new(AtomicBool::new(false));

    let compactors: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let db = open::<i64>(&path);
                let mut runs = 0u64;
                loop {
                    db.compact(true).unwrap();
                    runs += 1;
                    if stop.load(Ordering::Relaxed) {
                        break runs;
                    }
                }
            })
        })
        .collect();

    let writers: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|prefix| {
            let path = path.clone();
            thread::spawn(move || {
                let db = open::<i64>(&path);
                for i in 0..1000 {
                    db.set(&format!("{}{}", prefix, i), i).unwrap();
                    db.increment("counter").unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for compactor in compactors {
        assert!(compactor.join().unwrap() > 0);
    }

    let db = open::<i64>(&path);
    assert_eq!(db.get(&key("counter")).unwrap(), Some(2000));
    assert_eq!(db.len(), 2001);
    for i in 0..1000 {
        assert_eq!(db.get(&format!("a{}", i)).unwrap(), Some(i));
        assert_eq!(db.get(&format!("b{}", i)).unwrap(), Some(i));
    }
}
