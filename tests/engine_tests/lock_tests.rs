//! Tests for critical sections
//!
//! These tests verify:
//! - `lock` syncs before and flushes after the closure
//! - Nested calls (including compact/clear) do not deadlock
//! - The file lock is released on error and on panic
//! - Application-level atomic operations built on `lock`

use std::panic::{self, AssertUnwindSafe};

use dawnkv::{DawnError, Engine};

use super::{key, open, setup_temp_db, test_config, Counter};

#[test]
fn test_lock_returns_closure_result() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);

    let answer = db.lock(|_| Ok(42)).unwrap();
    assert_eq!(answer, 42);
}

#[test]
fn test_lock_syncs_first() {
    let (_temp, path) = setup_temp_db();
    let db1 = open::<i64>(&path);
    let db2 = open::<i64>(&path);

    db1.set_flush(&key("k"), 5).unwrap();

    let seen = db2.lock(|db| db.get(&key("k"))).unwrap();
    assert_eq!(seen, Some(5));
}

#[test]
fn test_lock_flushes_after() {
    let (_temp, path) = setup_temp_db();
    let db1 = open::<i64>(&path);
    let db2 = open::<i64>(&path);

    db1.lock(|db| db.set(&key("k"), 5)).unwrap();

    db2.sync().unwrap();
    assert_eq!(db2.get(&key("k")).unwrap(), Some(5));
}

#[test]
fn test_nested_lock() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);

    let inner = db
        .lock(|db| {
            db.set(&key("outer"), 1)?;
            db.lock(|db| {
                db.set(&key("inner"), 2)?;
                db.lock(|db| db.get(&key("outer")))
            })
        })
        .unwrap();

    assert_eq!(inner, Some(1));
    assert_eq!(db.len(), 2);
}

#[test]
fn test_maintenance_inside_lock() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);
    let other = open::<i64>(&path);

    db.lock(|db| {
        for i in 0..10 {
            db.set(&key("k"), i)?;
        }
        db.flush()?;
        db.compact(true)?;
        db.set_flush(&key("a"), 1)?;
        db.delete_flush(&key("a"))?;
        db.clear()?;
        db.set_flush(&key("after_clear"), 2)?;
        db.sync()
    })
    .unwrap();

    assert_eq!(db.len(), 1);
    other.sync().unwrap();
    assert_eq!(other.get(&key("after_clear")).unwrap(), Some(2));
    assert_eq!(other.get(&key("k")).unwrap(), None);
}

#[test]
fn test_lock_released_after_error() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);
    let other = open::<i64>(&path);

    let result: dawnkv::Result<()> = db.lock(|db| {
        db.set(&key("k"), 1)?;
        Err(DawnError::Serialization("abort".to_string()))
    });
    assert!(result.is_err());

    // Would block forever if the exclusive lock leaked
    other.set_flush(&key("other"), 2).unwrap();
    db.sync().unwrap();
    assert_eq!(db.get(&key("other")).unwrap(), Some(2));
}

#[test]
fn test_lock_released_after_panic() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);
    let other = open::<i64>(&path);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        db.lock(|_| -> dawnkv::Result<()> { panic!("inside critical section") })
    }));
    assert!(outcome.is_err());

    other.set_flush(&key("k"), 1).unwrap();
    db.set_flush(&key("k"), 2).unwrap();
    db.sync().unwrap();
    assert_eq!(db.get(&key("k")).unwrap(), Some(2));
}

#[test]
fn test_close_inside_lock() {
    let (_temp, path) = setup_temp_db();
    let db = open::<i64>(&path);

    db.lock(|db| {
        db.set(&key("k"), 1)?;
        db.close()
    })
    .unwrap();
    assert!(db.is_closed());

    let db = open::<i64>(&path);
    assert_eq!(db.get(&key("k")).unwrap(), Some(1));
}

#[test]
fn test_increment() {
    let (_temp, path) = setup_temp_db();
    let db: Engine<String, i64> = Engine::builder(&path).config(test_config()).open().unwrap();

    assert_eq!(db.increment("counter").unwrap(), 1);
    assert_eq!(db.increment("counter").unwrap(), 2);

    let other = open::<i64>(&path);
    assert_eq!(other.increment("counter").unwrap(), 3);
    assert_eq!(db.increment("counter").unwrap(), 4);
}
