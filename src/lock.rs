//! Inter-process file locking
//!
//! Advisory locks on the log file, shared between processes and between
//! independent handles inside one process.
//!
//! ## Protocol
//! - Replaying the log takes a **shared** lock.
//! - Appending, `lock` blocks, compaction and clear take the **exclusive** lock.
//! - After a lock is granted the holder checks that the path still names
//!   its file. Compaction and clear rename a new file over the path, so a
//!   waiter may wake up holding a lock on a file nobody else will ever
//!   look at again; it then reopens the path and tries again.

use std::fs::File;

use fs2::FileExt;

use crate::error::Result;
use crate::journal::LogFile;

/// Lock flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A held advisory lock, released on drop
///
/// Holds its own duplicate of the file handle so the log file can be
/// reopened or replaced while the lock is still held.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    mode: LockMode,
}

impl FileLock {
    /// Block until `mode` is granted on the file currently at the log's path
    ///
    /// Returns the lock and whether the log had to be reopened because the
    /// file was replaced since the handle was opened.
    pub fn acquire(log: &mut LogFile, mode: LockMode) -> Result<(Self, bool)> {
        let mut replaced = false;

        loop {
            let handle = log.handle().try_clone()?;
            lock_handle(&handle, mode)?;

            if log.is_current()? {
                return Ok((Self { file: handle, mode }, replaced));
            }

            FileExt::unlock(&handle)?;
            drop(handle);

            tracing::debug!(path = %log.path().display(), "log file was replaced, reopening");
            log.reopen()?;
            replaced = true;
        }
    }

    /// Lock a handle that is not visible to anyone else yet
    pub fn adopt(file: &File, mode: LockMode) -> Result<Self> {
        let handle = file.try_clone()?;
        lock_handle(&handle, mode)?;
        Ok(Self { file: handle, mode })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "failed to release file lock");
        }
    }
}

fn lock_handle(handle: &File, mode: LockMode) -> Result<()> {
    match mode {
        LockMode::Shared => FileExt::lock_shared(handle)?,
        LockMode::Exclusive => FileExt::lock_exclusive(handle)?,
    }
    Ok(())
}
