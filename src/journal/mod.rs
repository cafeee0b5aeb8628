//! Journal Module
//!
//! The append-only log every instance shares through the file system.
//!
//! ## Responsibilities
//! - Frame records with CRC32 checksums
//! - Buffer appends and flush them under the exclusive file lock
//! - Replay records appended by anyone since the last replay
//! - Tolerate a partial trailing record left by a crash
//! - Swap in a rewritten file atomically (compaction, clear)
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ Header: MAGIC "DAWNKV" (6) │ VERSION (2)              │
//! ├───────────────────────────────────────────────────────┤
//! │ Record 1                                              │
//! │ ┌─────────┬────────────┬─────────┬─────────┬───┬───┐  │
//! │ │ CRC (4) │ LenCRC (4) │ KLen(4) │ VLen(4) │ K │ V │  │
//! │ └─────────┴────────────┴─────────┴─────────┴───┴───┘  │
//! ├───────────────────────────────────────────────────────┤
//! │ Record 2 ...                                          │
//! └───────────────────────────────────────────────────────┘
//! ```
//! `LenCRC` covers `KLen ‖ VLen`, `CRC` covers `KLen ‖ VLen ‖ K ‖ V`.
//! `VLen == u32::MAX` marks a tombstone with no value bytes.

mod file;
mod reader;
mod record;
mod writer;

pub use file::{FlushOutcome, LogFile, Replacement};
pub use reader::FrameReader;
pub use record::{
    check_header, encode_header, Decoded, Record, FRAME_HEADER_SIZE, HEADER_SIZE, MAGIC,
    TOMBSTONE_MARKER, VERSION,
};
pub use writer::{Journal, Replayed};
