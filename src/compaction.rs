//! Compaction
//!
//! Rewrites the log so it holds one record per live key.
//!
//! ## Algorithm
//! 1. The caller holds the exclusive lock and has synced the index, so the
//!    index reflects every record in the file.
//! 2. Unless forced, skip when too few records are superseded.
//! 3. Write the header plus one put per live entry to a sibling file that is
//!    locked before anyone can see it.
//! 4. fsync, rename it over the log, fsync the directory.
//!
//! Handles still pointing at the old file notice the rename the next time
//! they take a lock, reopen the path and rebuild their index from it.
//! Their unflushed writes are appended to the new file.

use crate::error::Result;
use crate::index::Index;
use crate::journal::{Journal, Record};

/// What a call to `compact` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Not enough garbage to be worth a rewrite
    Skipped { records: u64, live: usize },

    /// The log was rewritten
    Compacted {
        records_before: u64,
        records_after: u64,
        bytes_before: u64,
        bytes_after: u64,
    },
}

/// Whether the superseded share of `records` reaches `threshold`
pub fn should_compact(records: u64, live: usize, threshold: f64) -> bool {
    if records == 0 {
        return false;
    }
    let stale = records.saturating_sub(live as u64);
    stale as f64 / records as f64 >= threshold
}

/// Rewrite the journal from the index
///
/// Must run inside a critical section with the index synced.
pub fn compact<V, D>(
    journal: &mut Journal,
    index: &Index<V>,
    dump: D,
    force: bool,
    threshold: f64,
) -> Result<CompactionOutcome>
where
    D: Fn(&V) -> Result<Vec<u8>>,
{
    let records_before = journal.records();
    let live = index.len();

    if !force && !should_compact(records_before, live, threshold) {
        tracing::debug!(records = records_before, live, "compaction skipped");
        return Ok(CompactionOutcome::Skipped {
            records: records_before,
            live,
        });
    }

    let bytes_before = journal.size()?;
    let records = index
        .iter()
        .map(|(key, value)| -> Result<Record> { Ok(Record::put(key.to_vec(), dump(value)?)) });
    let records_after = journal.rewrite(records)?;
    let bytes_after = journal.size()?;

    tracing::info!(
        path = %journal.path().display(),
        records_before,
        records_after,
        bytes_before,
        bytes_after,
        "compacted log"
    );

    Ok(CompactionOutcome::Compacted {
        records_before,
        records_after,
        bytes_before,
        bytes_after,
    })
}
