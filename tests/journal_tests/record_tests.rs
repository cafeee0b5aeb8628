//! Tests for record framing
//!
//! These tests verify:
//! - Put and tombstone frames decode back to the same record
//! - Every truncated frame reads as incomplete, never corrupt
//! - Checksum mismatches are reported as corruption
//! - A damaged length is corruption even when it points past the end
//! - Header validation

use dawnkv::journal::{
    check_header, encode_header, Decoded, Record, FRAME_HEADER_SIZE, HEADER_SIZE, MAGIC,
    TOMBSTONE_MARKER,
};
use dawnkv::DawnError;

use super::{delete, put};

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_decode_put() {
    let record = put("name", "dawn");
    let frame = record.encode().unwrap();

    assert_eq!(frame.len(), record.encoded_len());
    assert_eq!(
        Record::decode_next(&frame),
        Decoded::Record(record, FRAME_HEADER_SIZE + 8)
    );
}

#[test]
fn test_decode_tombstone() {
    let record = delete("name");
    let frame = record.encode().unwrap();

    assert_eq!(&frame[12..16], &TOMBSTONE_MARKER.to_le_bytes());
    match Record::decode_next(&frame) {
        Decoded::Record(decoded, consumed) => {
            assert!(decoded.is_tombstone());
            assert_eq!(decoded.key(), b"name");
            assert_eq!(consumed, frame.len());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_empty_value_is_not_a_tombstone() {
    let record = Record::put(b"k".to_vec(), Vec::new());
    let frame = record.encode().unwrap();

    match Record::decode_next(&frame) {
        Decoded::Record(decoded, _) => assert!(!decoded.is_tombstone()),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_decode_only_consumes_first_frame() {
    let mut bytes = put("a", "1").encode().unwrap().to_vec();
    bytes.extend_from_slice(&put("b", "2").encode().unwrap());

    match Record::decode_next(&bytes) {
        Decoded::Record(record, consumed) => {
            assert_eq!(record, put("a", "1"));
            assert_eq!(consumed, FRAME_HEADER_SIZE + 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

// =============================================================================
// Partial and Corrupt Frames
// =============================================================================

#[test]
fn test_every_truncation_is_incomplete() {
    let frame = put("key", "some value").encode().unwrap();

    for len in 0..frame.len() {
        assert_eq!(
            Record::decode_next(&frame[..len]),
            Decoded::Incomplete,
            "prefix of {} bytes",
            len
        );
    }
}

#[test]
fn test_flipped_value_byte_is_corrupt() {
    let mut frame = put("key", "value").encode().unwrap().to_vec();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    assert!(matches!(Record::decode_next(&frame), Decoded::Corrupt(_)));
}

#[test]
fn test_flipped_key_length_is_corrupt() {
    let mut frame = put("key", "value").encode().unwrap().to_vec();
    // High byte of the key length: the frame now claims ~1 GiB
    frame[11] = 0x40;

    assert!(matches!(Record::decode_next(&frame), Decoded::Corrupt(_)));
}

#[test]
fn test_flipped_value_length_is_corrupt() {
    let mut frame = put("key", "value").encode().unwrap().to_vec();
    frame[12] ^= 0x01;

    assert!(matches!(Record::decode_next(&frame), Decoded::Corrupt(_)));
}

#[test]
fn test_truncated_frame_with_valid_lengths_is_incomplete() {
    let frame = put("key", "value").encode().unwrap();

    assert_eq!(
        Record::decode_next(&frame[..FRAME_HEADER_SIZE + 1]),
        Decoded::Incomplete
    );
}

#[test]
fn test_flipped_crc_is_corrupt() {
    let mut frame = delete("key").encode().unwrap().to_vec();
    frame[0] ^= 0x01;

    assert!(matches!(Record::decode_next(&frame), Decoded::Corrupt(_)));
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_layout() {
    let header = encode_header();

    assert_eq!(header.len() as u64, HEADER_SIZE);
    assert_eq!(&header[..6], MAGIC);
    check_header(&header).unwrap();
}

#[test]
fn test_header_wrong_magic() {
    let mut header = encode_header();
    header[0] = b'X';

    assert!(matches!(check_header(&header), Err(DawnError::InvalidHeader(_))));
}

#[test]
fn test_header_wrong_version() {
    let mut header = encode_header();
    header[6] = 0xEE;

    assert!(matches!(check_header(&header), Err(DawnError::InvalidHeader(_))));
}

#[test]
fn test_header_too_short() {
    let header = encode_header();

    assert!(matches!(
        check_header(&header[..5]),
        Err(DawnError::InvalidHeader(_))
    ));
}
