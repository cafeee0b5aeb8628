//! Journal
//!
//! Keeps one handle's view of the shared log: what it has buffered, how far
//! it has replayed, and which file lock it currently holds.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::SyncStrategy;
use crate::error::Result;
use crate::lock::{FileLock, LockMode};

use super::file::LogFile;
use super::reader::FrameReader;
use super::record::{self, Record, HEADER_SIZE};

/// One step of a replay, handed to the caller in log order
#[derive(Debug, PartialEq, Eq)]
pub enum Replayed {
    /// The file was replaced; drop everything derived from the old one
    Reset,

    /// The next record in the file
    Record(Record),
}

/// Buffered writer and incremental reader over the shared log file
pub struct Journal {
    /// The log file itself
    file: LogFile,

    /// Whether flushes fsync
    sync_strategy: SyncStrategy,

    /// Records sitting in the file buffer
    pending_records: u64,

    /// Bytes of the current file already replayed
    read_offset: u64,

    /// Records of the current file already replayed
    records: u64,

    /// Replay must restart from the header (file replaced or not read yet)
    reload: bool,

    /// Exclusive lock held across a critical section
    held: Option<FileLock>,

    /// Nesting depth of critical sections
    depth: usize,
}

impl Journal {
    /// Open or create the log at `path`
    ///
    /// Nothing is replayed yet; the first `replay` reads the whole file.
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = LogFile::open(path)?;

        let mut journal = Self {
            file,
            sync_strategy,
            pending_records: 0,
            read_offset: HEADER_SIZE,
            records: 0,
            reload: true,
            held: None,
            depth: 0,
        };

        journal.with_lock(LockMode::Exclusive, |j| {
            if j.file.ensure_header()? {
                tracing::debug!(path = %j.file.path().display(), "created new log file");
            }
            j.file.check_header()
        })?;

        Ok(journal)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Buffer a record
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let frame = record.encode()?;
        self.file.append(&frame);
        self.pending_records += 1;
        Ok(())
    }

    /// Bytes buffered but not yet written
    pub fn buffered_bytes(&self) -> usize {
        self.file.pending()
    }

    /// Write the buffer to the log under the exclusive lock
    pub fn flush(&mut self) -> Result<()> {
        if self.file.pending() == 0 {
            return Ok(());
        }
        self.with_lock(LockMode::Exclusive, Self::write_pending)
    }

    fn write_pending(&mut self) -> Result<()> {
        if self.file.ensure_header()? {
            // The path was removed and recreated underneath us
            self.reload = true;
        }
        self.cut_torn_tail()?;

        let outcome = self.file.flush(self.sync_strategy)?;

        // Caught up before writing: our own records need no replay
        if !self.reload && outcome.start == self.read_offset {
            self.read_offset += outcome.written;
            self.records += self.pending_records;
        }

        tracing::trace!(
            records = self.pending_records,
            bytes = outcome.written,
            offset = outcome.start,
            "flushed write buffer"
        );
        self.pending_records = 0;
        Ok(())
    }

    /// Cut off a partial record left by a crashed writer
    ///
    /// Walks the frames this journal has not replayed yet, without applying
    /// them, and truncates the file at an incomplete trailing frame. Only
    /// safe under the exclusive lock: live writers append whole buffers
    /// while holding it, so a partial frame cannot belong to one of them.
    /// A corrupt frame fails the flush rather than burying it under new ones.
    fn cut_torn_tail(&mut self) -> Result<()> {
        let from = if self.reload {
            HEADER_SIZE
        } else {
            self.read_offset
        };
        if self.file.size()? <= from {
            return Ok(());
        }

        let bytes = self.file.read_from(from)?;
        let mut reader = FrameReader::new(&bytes, from);
        for record in reader.by_ref() {
            record?;
        }

        if reader.is_torn() {
            tracing::warn!(
                path = %self.file.path().display(),
                offset = reader.offset(),
                bytes = from + bytes.len() as u64 - reader.offset(),
                "discarding incomplete trailing record"
            );
            self.file.truncate(reader.offset())?;
        }
        Ok(())
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Feed every record appended since the last replay to `apply`
    ///
    /// Emits `Replayed::Reset` first when the file has to be read from the
    /// start again. Stops silently before an incomplete trailing record and
    /// with `Corruption` at a complete record that fails its checksum.
    /// Returns the number of records replayed.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<u64>
    where
        F: FnMut(Replayed) -> Result<()>,
    {
        self.with_lock(LockMode::Shared, |j| j.replay_locked(&mut apply))
    }

    fn replay_locked(&mut self, apply: &mut dyn FnMut(Replayed) -> Result<()>) -> Result<u64> {
        let size = self.file.size()?;

        if !self.reload && size < self.read_offset {
            tracing::warn!(
                path = %self.file.path().display(),
                size,
                read_offset = self.read_offset,
                "log file shrank, replaying from the start"
            );
            self.reload = true;
        }

        if self.reload {
            apply(Replayed::Reset)?;
            self.records = 0;
            self.read_offset = HEADER_SIZE;

            if size < HEADER_SIZE {
                // Recreated file whose header has not been written yet
                return Ok(0);
            }
            self.file.check_header()?;
            self.reload = false;
        }

        if size == self.read_offset {
            return Ok(0);
        }

        let base = self.read_offset;
        let bytes = self.file.read_from(base)?;
        let mut reader = FrameReader::new(&bytes, base);
        let mut replayed = 0;

        while let Some(record) = reader.next() {
            apply(Replayed::Record(record?))?;
            self.read_offset = reader.offset();
            self.records += 1;
            replayed += 1;
        }

        if reader.is_torn() {
            tracing::trace!(offset = reader.offset(), "stopped before incomplete record");
        }

        Ok(replayed)
    }

    // =========================================================================
    // Critical Sections
    // =========================================================================

    /// Enter a critical section, taking the exclusive lock at depth zero
    pub fn hold(&mut self) -> Result<()> {
        if self.depth == 0 {
            let (lock, replaced) = FileLock::acquire(&mut self.file, LockMode::Exclusive)?;
            if replaced {
                self.mark_replaced();
            }
            self.held = Some(lock);
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave a critical section, releasing the lock at depth zero
    pub fn release(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.held = None;
        }
    }

    /// Whether this journal is inside a critical section
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Run `f` with at least `mode` held
    ///
    /// Inside a critical section the exclusive lock already covers
    /// everything, so nothing is acquired.
    fn with_lock<R>(&mut self, mode: LockMode, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.held.is_some() {
            return f(self);
        }

        let (lock, replaced) = FileLock::acquire(&mut self.file, mode)?;
        if replaced {
            self.mark_replaced();
        }

        let result = f(self);
        drop(lock);
        result
    }

    fn mark_replaced(&mut self) {
        self.reload = true;
    }

    // =========================================================================
    // Replacement
    // =========================================================================

    /// Replace the log with a new file holding exactly `records`
    ///
    /// Must be called inside a critical section. The new file is locked
    /// before it becomes visible at the path, and that lock takes over from
    /// the one on the old file. Returns the number of records written.
    pub fn rewrite<I>(&mut self, records: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        debug_assert!(self.is_held(), "rewrite outside a critical section");

        let replacement = self.file.create_replacement()?;
        let lock = FileLock::adopt(replacement.handle(), LockMode::Exclusive)?;

        let mut written = 0u64;
        {
            let mut writer = BufWriter::new(replacement.handle());
            writer.write_all(&record::encode_header())?;
            for record in records {
                writer.write_all(&record?.encode()?)?;
                written += 1;
            }
            writer.flush()?;
        }

        self.file.install(replacement)?;
        self.held = Some(lock);

        self.read_offset = self.file.size()?;
        self.records = written;
        self.reload = false;

        Ok(written)
    }

    /// Drop buffered records and replace the log with an empty one
    pub fn clear(&mut self) -> Result<()> {
        self.file.discard_pending();
        self.pending_records = 0;
        self.rewrite(std::iter::empty())?;
        Ok(())
    }

    // =========================================================================
    // Lifecycle & Accessors
    // =========================================================================

    /// Flush, release any held lock, and close the file
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.held = None;
        self.file.close()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Current size of the log file in bytes
    pub fn size(&self) -> Result<u64> {
        self.file.size()
    }

    /// Records replayed from (or written to) the current file
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Bytes of the current file already replayed
    pub fn read_offset(&self) -> u64 {
        self.read_offset
    }
}
