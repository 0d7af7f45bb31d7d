//! Message header parsing/serialization (C1).
//!
//! Grounded on `nativepg/wire/messages.hpp::message_header` /
//! `serialize_header` / `parse_header`, and the teacher's
//! `postgres/connection/stream.rs::recv_unchecked` (5-byte header read,
//! `size = header.get_u32() - 4`).

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// A parsed message header: a 1-byte type tag and a signed 32-bit length.
///
/// The length covers itself plus the payload, excluding the tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub tag: u8,
    pub length: i32,
}

impl MessageHeader {
    /// Number of payload bytes following the header (`length - 4`).
    pub fn payload_len(&self) -> usize {
        (self.length - 4) as usize
    }
}

/// Parses a 5-byte header (`{tag, length}`). Fails with
/// [`Error::ProtocolValueError`] if `length < 4`.
pub fn parse_header(bytes: &[u8; 5]) -> Result<MessageHeader> {
    let tag = bytes[0];
    let length = BigEndian::read_i32(&bytes[1..5]);
    if length < 4 {
        return Err(Error::ProtocolValueError(format!(
            "message length {length} is less than the minimum of 4"
        )));
    }
    Ok(MessageHeader { tag, length })
}

/// Serializes a header into a 5-byte buffer. `length` is taken as a wider
/// integer than the wire field so that an out-of-range request (length =
/// `INT32_MAX + 1`) can actually be represented and rejected with
/// [`Error::ValueTooBig`] rather than wrapping silently.
pub fn serialize_header(tag: u8, length: i64) -> Result<[u8; 5]> {
    if length > i32::MAX as i64 {
        return Err(Error::ValueTooBig(format!(
            "message length {length} exceeds INT32_MAX"
        )));
    }
    let mut out = [0u8; 5];
    out[0] = tag;
    BigEndian::write_i32(&mut out[1..5], length as i32);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_complete_header_parses() {
        // CommandComplete fixture from the spec: tag 'C', length 0x0D (13).
        let bytes = [0x43, 0x00, 0x00, 0x00, 0x0D];
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.tag, b'C');
        assert_eq!(header.length, 13);
        assert_eq!(header.payload_len(), 9);
    }

    #[test]
    fn rejects_length_below_four() {
        let bytes = [0x43, 0x00, 0x00, 0x00, 0x03];
        assert!(matches!(
            parse_header(&bytes),
            Err(Error::ProtocolValueError(_))
        ));
    }

    #[test]
    fn header_serialize_is_inverse_of_parse() {
        for length in [4i64, 5, 1000, i32::MAX as i64] {
            let bytes = serialize_header(b'Z', length).unwrap();
            let parsed = parse_header(&bytes).unwrap();
            assert_eq!(
                parsed,
                MessageHeader {
                    tag: b'Z',
                    length: length as i32
                }
            );
        }
    }

    #[test]
    fn header_serialize_rejects_overflow() {
        let result = serialize_header(b'Z', i32::MAX as i64 + 1);
        assert!(matches!(result, Err(Error::ValueTooBig(_))));
    }
}
