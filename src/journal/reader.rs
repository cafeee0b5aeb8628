//! Frame Reader
//!
//! Walks a byte range read from the log and yields records in order.

use crate::error::{DawnError, Result};

use super::record::{Decoded, Record};

/// Lazy iterator over the frames in a byte range
///
/// Stops cleanly on an incomplete trailing frame (see [`FrameReader::is_torn`])
/// and yields a `Corruption` error for a complete frame that fails its check.
pub struct FrameReader<'a> {
    /// Bytes being decoded
    bytes: &'a [u8],

    /// Position of the next frame within `bytes`
    pos: usize,

    /// File offset of `bytes[0]`
    base_offset: u64,

    /// Set once a trailing partial frame was seen
    torn: bool,

    /// Set once a corrupt frame was reported
    failed: bool,
}

impl<'a> FrameReader<'a> {
    pub fn new(bytes: &'a [u8], base_offset: u64) -> Self {
        Self {
            bytes,
            pos: 0,
            base_offset,
            torn: false,
            failed: false,
        }
    }

    /// File offset just past the last complete frame
    pub fn offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    /// Whether decoding stopped before a partial trailing frame
    pub fn is_torn(&self) -> bool {
        self.torn
    }
}

impl Iterator for FrameReader<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.torn || self.pos >= self.bytes.len() {
            return None;
        }

        match Record::decode_next(&self.bytes[self.pos..]) {
            Decoded::Record(record, consumed) => {
                self.pos += consumed;
                Some(Ok(record))
            }
            Decoded::Incomplete => {
                self.torn = true;
                None
            }
            Decoded::Corrupt(reason) => {
                self.failed = true;
                Some(Err(DawnError::Corruption {
                    offset: self.offset(),
                    reason,
                }))
            }
        }
    }
}
