//! Log File
//!
//! Owns the on-disk file handle, the pending write buffer, and the
//! replace-by-rename primitive used by compaction and clear.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};

use crate::config::SyncStrategy;
use crate::error::Result;

use super::record::{self, HEADER_SIZE};

/// Distinguishes replacement files created by one process
static NEXT_REPLACEMENT_ID: AtomicU64 = AtomicU64::new(0);

/// Where a flush landed in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// File length before the write
    pub start: u64,
    /// Bytes written
    pub written: u64,
}

/// The append-only log file
///
/// Appends are buffered in memory until [`LogFile::flush`]. The handle is
/// opened in append mode, so every flush lands at the current end of the
/// file whatever other handles have written in the meantime.
pub struct LogFile {
    /// Path the log lives at
    path: PathBuf,

    /// Open handle (read + append)
    file: File,

    /// Frames appended but not yet written
    buffer: BytesMut,
}

impl LogFile {
    /// Open the log at `path`, creating an empty file if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        let file = Self::open_handle(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            buffer: BytesMut::new(),
        })
    }

    fn open_handle(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw handle, used to take advisory locks
    pub(crate) fn handle(&self) -> &File {
        &self.file
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Buffer a frame; nothing reaches the file until `flush`
    pub fn append(&mut self, frame: &[u8]) {
        self.buffer.extend_from_slice(frame);
    }

    /// Number of buffered bytes
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop every buffered frame
    pub fn discard_pending(&mut self) {
        self.buffer.clear();
    }

    /// Write the buffer at the end of the file
    ///
    /// A failed write is rolled back to the previous length (best effort)
    /// and the buffer is kept so the caller may retry.
    pub fn flush(&mut self, strategy: SyncStrategy) -> Result<FlushOutcome> {
        let start = self.size()?;
        if self.buffer.is_empty() {
            return Ok(FlushOutcome { start, written: 0 });
        }

        if let Err(e) = (&self.file).write_all(&self.buffer) {
            if let Err(rollback) = self.file.set_len(start) {
                tracing::warn!(
                    path = %self.path.display(),
                    offset = start,
                    error = %rollback,
                    "failed to roll back partial write"
                );
            }
            return Err(e.into());
        }

        if strategy == SyncStrategy::EveryFlush {
            self.file.sync_data()?;
        }

        let written = self.buffer.len() as u64;
        self.buffer.clear();
        Ok(FlushOutcome { start, written })
    }

    /// Force written bytes to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Cut the file down to `len` bytes
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    /// Write the header into an empty (or torn-header) file
    ///
    /// Returns true when the header had to be written. Call with the
    /// exclusive lock held.
    pub fn ensure_header(&mut self) -> Result<bool> {
        let size = self.size()?;
        if size >= HEADER_SIZE {
            return Ok(false);
        }

        if size > 0 {
            tracing::warn!(path = %self.path.display(), size, "discarding incomplete log header");
            self.file.set_len(0)?;
        }
        (&self.file).write_all(&record::encode_header())?;
        self.file.sync_all()?;
        Ok(true)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Current file length in bytes
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Read everything from `offset` up to the current end of the file
    pub fn read_from(&self, offset: u64) -> Result<Bytes> {
        let mut handle = &self.file;
        handle.seek(SeekFrom::Start(offset))?;

        let mut buf = Vec::new();
        handle.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Validate the file header
    pub fn check_header(&self) -> Result<()> {
        let mut handle = &self.file;
        handle.seek(SeekFrom::Start(0))?;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        handle.take(HEADER_SIZE).read_to_end(&mut header)?;
        record::check_header(&header)
    }

    // =========================================================================
    // Identity & Replacement
    // =========================================================================

    /// Whether `path` still names the file behind this handle
    ///
    /// False once another handle renamed a replacement over the path or the
    /// file was removed.
    #[cfg(unix)]
    pub fn is_current(&self) -> Result<bool> {
        use std::os::unix::fs::MetadataExt;

        let ours = self.file.metadata()?;
        if ours.nlink() == 0 {
            return Ok(false);
        }

        match fs::metadata(&self.path) {
            Ok(theirs) => Ok(theirs.dev() == ours.dev() && theirs.ino() == ours.ino()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(unix))]
    pub fn is_current(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    /// Close the handle and open whatever file is at `path` now
    ///
    /// Buffered frames are kept; they will be written to the new file.
    pub fn reopen(&mut self) -> Result<()> {
        self.file = Self::open_handle(&self.path)?;
        Ok(())
    }

    /// Create an empty sibling file that can later replace this one
    pub fn create_replacement(&self) -> Result<Replacement> {
        let id = NEXT_REPLACEMENT_ID.fetch_add(1, Ordering::Relaxed);
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dawnkv".to_string());
        let path = self
            .path
            .with_file_name(format!("{}.{}.{}.tmp", file_name, process::id(), id));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(Replacement {
            path,
            file,
            installed: false,
        })
    }

    /// Atomically rename `replacement` over the log and switch to its handle
    ///
    /// Readers opening the path see either the old or the new file, never a
    /// mix. The buffer is left untouched.
    pub fn install(&mut self, mut replacement: Replacement) -> Result<()> {
        replacement.file.sync_all()?;
        fs::rename(&replacement.path, &self.path)?;
        replacement.installed = true;
        sync_parent_dir(&self.path)?;

        // Reopen in append mode; the lock on the replacement handle stays
        // with whoever adopted it.
        self.file = Self::open_handle(&self.path)?;
        Ok(())
    }

    /// Close the handle after making written bytes durable
    pub fn close(self) -> Result<()> {
        self.sync()
    }
}

/// A not-yet-installed replacement for the log file
///
/// Removed from disk on drop unless it was installed.
pub struct Replacement {
    path: PathBuf,
    file: File,
    installed: bool,
}

impl Replacement {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn handle(&self) -> &File {
        &self.file
    }
}

impl Drop for Replacement {
    fn drop(&mut self) {
        if !self.installed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Fsync the directory holding `path` so a rename is durable
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
