//! SML transport framing.
//!
//! A frame as it appears on the wire:
//! ```text
//! ┌───────────────────────┬──────────────┬──────┬─────────────┬──────┬───────────┐
//! │ 1b 1b 1b 1b 01 01 01 01│  messages    │ 00.. │ 1b 1b 1b 1b │  1a  │ fill, crc │
//! │  start (8 bytes)      │              │ fill │ end escape  │ EOM  │  3 bytes  │
//! └───────────────────────┴──────────────┴──────┴─────────────┴──────┴───────────┘
//! ```
//! The checksum is CRC-16/X-25 over everything before it, stored little-endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Start sequence: escape plus version 1 marker.
pub const START: &[u8] = b"\x1b\x1b\x1b\x1b\x01\x01\x01\x01";

/// End escape sequence, followed by the trailer.
pub const END: &[u8] = b"\x1b\x1b\x1b\x1b";

/// Trailer length: end-of-message byte, fill count, checksum.
pub const TRAILER_LEN: usize = 4;

/// First trailer byte.
pub const END_OF_MESSAGE: u8 = 0x1a;

/// Smallest frame that holds both markers and the trailer.
pub const MIN_FRAME_SIZE: usize = START.len() + END.len() + TRAILER_LEN;

/// Checks the structural well-formedness of a reassembled frame.
///
/// The frame must begin with [`START`], the bytes between the start sequence and
/// the trailer must end with [`END`], and the trailer must begin with
/// [`END_OF_MESSAGE`]. The checksum is not verified.
pub fn validate(frame: &[u8]) -> Result<(), FrameError> {
    if !frame.starts_with(START) {
        return Err(FrameError::MalformedStart);
    }
    if frame.len() < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort(frame.len()));
    }
    let (inner, trailer) = frame.split_at(frame.len() - TRAILER_LEN);
    if !inner[START.len()..].ends_with(END) {
        return Err(FrameError::MalformedEnd);
    }
    if trailer[0] != END_OF_MESSAGE {
        return Err(FrameError::MalformedTrailer(trailer.to_vec()));
    }
    Ok(())
}

/// Number of fill bytes announced by the trailer.
#[must_use]
pub fn fill_count(frame: &[u8]) -> Option<usize> {
    frame
        .len()
        .checked_sub(TRAILER_LEN - 1)
        .and_then(|pos| frame.get(pos))
        .map(|&n| usize::from(n))
}

/// CRC-16/X-25 (reflected 0x1021, init and xorout 0xffff).
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
    }
    !crc
}

/// Returns true if the trailer checksum matches the frame contents.
#[must_use]
pub fn checksum_matches(frame: &[u8]) -> bool {
    if frame.len() < MIN_FRAME_SIZE {
        return false;
    }
    let (data, stored) = frame.split_at(frame.len() - 2);
    crc16(data).to_le_bytes() == stored
}

/// Wraps encoded messages into a complete frame with fill bytes and checksum.
#[must_use]
pub fn encode(messages: &[u8]) -> Bytes {
    let fill = (4 - messages.len() % 4) % 4;
    let mut buf = BytesMut::with_capacity(MIN_FRAME_SIZE + messages.len() + fill);
    buf.put_slice(START);
    buf.put_slice(messages);
    buf.put_bytes(0, fill);
    buf.put_slice(END);
    buf.put_u8(END_OF_MESSAGE);
    buf.put_u8(fill as u8);
    let crc = crc16(&buf);
    buf.put_u16_le(crc);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pads_to_four_bytes() {
        let frame = encode(&[0x76, 0x00, 0x00]);
        assert_eq!(frame.len(), MIN_FRAME_SIZE + 4);
        assert_eq!(&frame[8..12], &[0x76, 0x00, 0x00, 0x00]);
        assert_eq!(fill_count(&frame), Some(1));
        assert!(validate(&frame).is_ok());
        assert!(checksum_matches(&frame));
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x906e);
    }

    #[test]
    fn test_malformed_start() {
        let mut frame = encode(b"\x00\x00\x00\x00").to_vec();
        frame[4] = 0x02;
        assert_eq!(validate(&frame), Err(FrameError::MalformedStart));
    }

    #[test]
    fn test_malformed_end() {
        let mut frame = encode(b"\x00\x00\x00\x00").to_vec();
        let end = frame.len() - TRAILER_LEN - 1;
        frame[end] = 0x00;
        assert_eq!(validate(&frame), Err(FrameError::MalformedEnd));
    }

    #[test]
    fn test_next_frame_start_taken_as_end() {
        // End escape lost: the next frame's start escape terminates the payload and
        // its version marker lands in the trailer.
        let mut frame = START.to_vec();
        frame.extend_from_slice(&[0x76, 0x05, 0x01, 0x02]);
        frame.extend_from_slice(END);
        frame.extend_from_slice(&[0x01, 0x01, 0x01, 0x01]);
        assert_eq!(
            validate(&frame),
            Err(FrameError::MalformedTrailer(vec![1, 1, 1, 1]))
        );
    }

    #[test]
    fn test_too_short() {
        let frame = [START, END].concat();
        assert_eq!(validate(&frame), Err(FrameError::TooShort(12)));
    }
}
