//! Minimal big-endian cursor/writer helpers used by the wire codec.
//!
//! Grounded on the teacher's `io/buf.rs` (`Buf` trait) and `io/buf_mut.rs`
//! (`BufMut` trait); unlike those, every integer here is always big-endian
//! (the wire protocol never uses anything else), so there is no generic
//! byte-order parameter, and the underlying storage is a plain `Vec<u8>`
//! and borrowed slices rather than `bytes::Bytes`/`BytesMut` — this crate
//! never needs their shared-ownership refcounting.

use byteorder::{BigEndian, ByteOrder};
use memchr::memchr;

use crate::error::{Error, Result};

/// A read cursor over a borrowed byte slice, used while parsing one message
/// body. Every accessor advances the cursor or fails with
/// [`Error::IncompleteMessage`] / [`Error::ProtocolValueError`].
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(Error::IncompleteMessage {
                needed: n - self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        self.require(2)?;
        let v = BigEndian::read_i16(&self.buf[self.pos..]);
        self.pos += 2;
        Ok(v)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(self.get_i16()? as u16)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        self.require(4)?;
        let v = BigEndian::read_i32(&self.buf[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.require(4)?;
        let v = BigEndian::read_u32(&self.buf[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.require(8)?;
        let v = BigEndian::read_i64(&self.buf[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        self.require(4)?;
        let v = BigEndian::read_f32(&self.buf[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        self.require(8)?;
        let v = BigEndian::read_f64(&self.buf[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    /// Reads `len` raw bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.require(len)?;
        let v = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(v)
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.get_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Reads a NUL-terminated UTF-8 string, not including the terminator.
    pub fn get_str_nul(&mut self) -> Result<&'a str> {
        let nul = memchr(0, &self.buf[self.pos..]).ok_or(Error::IncompleteMessage { needed: 1 })?;
        let s = std::str::from_utf8(&self.buf[self.pos..self.pos + nul])
            .map_err(|e| Error::ProtocolValueError(format!("invalid utf-8: {e}")))?;
        self.pos += nul + 1;
        Ok(s)
    }

    /// Consumes the remainder of the buffer as raw bytes.
    pub fn get_rest(&mut self) -> &'a [u8] {
        let v = &self.buf[self.pos..];
        self.pos = self.buf.len();
        v
    }

    /// Asserts the cursor reached the end of the buffer; otherwise `extra_bytes`.
    pub fn finish(self) -> Result<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(Error::ExtraBytes)
        }
    }
}

/// Append-only writer used while serializing frontend messages.
pub trait BufMutExt {
    fn put_u8(&mut self, v: u8);
    fn put_i16(&mut self, v: i16);
    fn put_i32(&mut self, v: i32);
    fn put_u32(&mut self, v: u32);
    fn put_i64(&mut self, v: i64);
    fn put_f32(&mut self, v: f32);
    fn put_f64(&mut self, v: f64);
    fn put_bytes(&mut self, bytes: &[u8]);
    fn put_str_nul(&mut self, s: &str);
}

impl BufMutExt for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }

    fn put_i16(&mut self, v: i16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_i64(&mut self, v: i64) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_f64(&mut self, v: f64) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    fn put_str_nul(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
        self.push(0);
    }
}

/// Writes a message tag + 4-byte length placeholder, runs `body`, then
/// back-patches the length (covers itself + body, excludes the tag).
///
/// Mirrors the original's `request.hpp` pattern of appending into one growing
/// buffer and patching the length after the fact.
pub fn with_length_prefix(
    buf: &mut Vec<u8>,
    tag: Option<u8>,
    body: impl FnOnce(&mut Vec<u8>) -> Result<()>,
) -> Result<()> {
    if let Some(tag) = tag {
        buf.put_u8(tag);
    }
    let len_pos = buf.len();
    buf.put_i32(0); // placeholder
    body(buf)?;
    let body_len = buf.len() - len_pos; // includes the 4 length bytes
    if body_len > i32::MAX as usize {
        return Err(Error::ValueTooBig(format!(
            "message body of {body_len} bytes exceeds INT32_MAX"
        )));
    }
    BigEndian::write_i32(&mut buf[len_pos..len_pos + 4], body_len as i32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reads_fields_in_order() {
        let data = [0x00, 0x00, 0x00, 0x2A, b'h', b'i', 0x00];
        let mut r = Reader::new(&data);
        assert_eq!(r.get_i32().unwrap(), 42);
        assert_eq!(r.get_str_nul().unwrap(), "hi");
        r.finish().unwrap();
    }

    #[test]
    fn reader_reports_incomplete() {
        let data = [0x00, 0x00];
        let mut r = Reader::new(&data);
        assert!(matches!(
            r.get_i32(),
            Err(Error::IncompleteMessage { needed: 2 })
        ));
    }

    #[test]
    fn reader_reports_extra_bytes() {
        let data = [0x00, 0x00, 0x00, 0x01, 0xFF];
        let mut r = Reader::new(&data);
        let _ = r.get_i32().unwrap();
        assert!(matches!(r.finish(), Err(Error::ExtraBytes)));
    }

    #[test]
    fn length_prefix_round_trips() {
        let mut buf = Vec::new();
        with_length_prefix(&mut buf, Some(b'Q'), |b| {
            b.put_str_nul("select 1;");
            Ok(())
        })
        .unwrap();
        assert_eq!(
            buf,
            vec![
                0x51, 0x00, 0x00, 0x00, 0x0E, 0x73, 0x65, 0x6C, 0x65, 0x63, 0x74, 0x20, 0x31,
                0x3B, 0x00,
            ]
        );
    }
}
