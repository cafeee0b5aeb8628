//! Log record definitions
//!
//! Defines the file header and the framing of individual records.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DawnError, Result};

/// Magic bytes at the start of every log file
pub const MAGIC: &[u8; 6] = b"DAWNKV";

/// Current log format version
pub const VERSION: u16 = 1;

/// Header size: magic (6) + version (2)
pub const HEADER_SIZE: u64 = 8;

/// Frame prefix: CRC (4) + length CRC (4) + key length (4) + value length (4)
pub const FRAME_HEADER_SIZE: usize = 16;

/// Offset of the key/value lengths within a frame
const LENGTHS_OFFSET: usize = 8;

/// Value length that marks a delete
pub const TOMBSTONE_MARKER: u32 = u32::MAX;

/// A single logged mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// Outcome of decoding the next frame from a byte slice
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A valid record and the number of bytes it occupied
    Record(Record, usize),

    /// Not enough bytes for a whole frame
    Incomplete,

    /// The frame is complete but its checksum does not match
    Corrupt(String),
}

impl Record {
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Record::Put { key, value }
    }

    pub fn delete(key: Vec<u8>) -> Self {
        Record::Delete { key }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Record::Put { key, .. } | Record::Delete { key } => key,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Record::Delete { .. })
    }

    /// Size of this record once framed
    pub fn encoded_len(&self) -> usize {
        match self {
            Record::Put { key, value } => FRAME_HEADER_SIZE + key.len() + value.len(),
            Record::Delete { key } => FRAME_HEADER_SIZE + key.len(),
        }
    }

    /// Frame the record:
    /// `[crc(4)][len_crc(4)][key_len(4)][val_len(4)][key][value]`
    ///
    /// `len_crc` covers the two lengths alone, `crc` covers everything
    /// after `len_crc`.
    pub fn encode(&self) -> Result<Bytes> {
        let key = self.key();
        let key_len = u32::try_from(key.len()).map_err(|_| DawnError::RecordTooLarge(key.len()))?;

        let (val_len, value): (u32, &[u8]) = match self {
            Record::Put { value, .. } => {
                let len = u32::try_from(value.len())
                    .ok()
                    .filter(|len| *len != TOMBSTONE_MARKER)
                    .ok_or(DawnError::RecordTooLarge(value.len()))?;
                (len, value)
            }
            Record::Delete { .. } => (TOMBSTONE_MARKER, &[]),
        };

        let mut lengths = [0u8; 8];
        lengths[..4].copy_from_slice(&key_len.to_le_bytes());
        lengths[4..].copy_from_slice(&val_len.to_le_bytes());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lengths);
        hasher.update(key);
        hasher.update(value);

        let mut frame = BytesMut::with_capacity(self.encoded_len());
        frame.put_u32_le(hasher.finalize());
        frame.put_u32_le(crc32fast::hash(&lengths));
        frame.put_slice(&lengths);
        frame.put_slice(key);
        frame.put_slice(value);
        Ok(frame.freeze())
    }

    /// Decode the frame at the start of `bytes`
    ///
    /// Lengths are only trusted once their own checksum matches, so a
    /// damaged length is `Corrupt` rather than a frame running past the end.
    pub fn decode_next(bytes: &[u8]) -> Decoded {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Decoded::Incomplete;
        }

        let mut header = &bytes[..FRAME_HEADER_SIZE];
        let crc = header.get_u32_le();
        let len_crc = header.get_u32_le();

        let actual = crc32fast::hash(&bytes[LENGTHS_OFFSET..FRAME_HEADER_SIZE]);
        if actual != len_crc {
            return Decoded::Corrupt(format!(
                "length CRC mismatch: expected {:#010x}, got {:#010x}",
                len_crc, actual
            ));
        }

        let key_len = header.get_u32_le() as usize;
        let val_len = header.get_u32_le();

        let value_size = if val_len == TOMBSTONE_MARKER { 0 } else { val_len as usize };
        let total = match FRAME_HEADER_SIZE
            .checked_add(key_len)
            .and_then(|n| n.checked_add(value_size))
        {
            Some(total) => total,
            None => return Decoded::Corrupt("frame length overflows".to_string()),
        };
        if bytes.len() < total {
            return Decoded::Incomplete;
        }

        let actual = crc32fast::hash(&bytes[LENGTHS_OFFSET..total]);
        if actual != crc {
            return Decoded::Corrupt(format!(
                "CRC mismatch: expected {:#010x}, got {:#010x}",
                crc, actual
            ));
        }

        let key_start = FRAME_HEADER_SIZE;
        let key = bytes[key_start..key_start + key_len].to_vec();
        let record = if val_len == TOMBSTONE_MARKER {
            Record::Delete { key }
        } else {
            let value = bytes[key_start + key_len..total].to_vec();
            Record::Put { key, value }
        };

        Decoded::Record(record, total)
    }
}

// =============================================================================
// File Header
// =============================================================================

/// The bytes every log file starts with
pub fn encode_header() -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[..6].copy_from_slice(MAGIC);
    header[6..].copy_from_slice(&VERSION.to_le_bytes());
    header
}

/// Validate the first `HEADER_SIZE` bytes of a log file
pub fn check_header(bytes: &[u8]) -> Result<()> {
    if bytes.len() < HEADER_SIZE as usize {
        return Err(DawnError::InvalidHeader(format!(
            "expected {} header bytes, found {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }
    if &bytes[..6] != MAGIC {
        return Err(DawnError::InvalidHeader("not a dawnkv log file".to_string()));
    }

    let version = u16::from_le_bytes([bytes[6], bytes[7]]);
    if version != VERSION {
        return Err(DawnError::InvalidHeader(format!(
            "unsupported format version {} (expected {})",
            version, VERSION
        )));
    }
    Ok(())
}
