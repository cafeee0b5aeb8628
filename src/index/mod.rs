//! Index Module
//!
//! In-memory map from key to current value, derived by replaying the log.
//!
//! ## Responsibilities
//! - Serve every read without touching the file
//! - Apply records in log order (later records win, tombstones remove)
//! - Hand out live entries in key order for compaction
//!
//! ## Data Structure Choice
//! Using BTreeMap:
//! - Ordered keys make compacted files deterministic
//! - Locking lives one level up, in the engine's state mutex

mod table;

pub use table::Index;

/// Effect of one record on the index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEntry<V> {
    /// A live value
    Value(V),

    /// A tombstone (deleted key)
    Tombstone,
}
