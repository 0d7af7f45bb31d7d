//! `int2`/`int4`/`int8` (oids 21/23/20). Binary is big-endian two's
//! complement; text is the ASCII decimal form. Reading into a wider Rust
//! integer than the column's declared width is allowed (widen-on-read);
//! reading into a narrower one is not.
//!
//! Grounded on `sqlx-core/src/postgres/types/int.rs` for the byte layout and
//! `nativepg/field_traits.hpp::field_parse<int32_t>` for the widen-then-store
//! decode shape.

use super::{oid, FieldType};
use crate::error::{Error, Result};
use crate::types::Encode;

fn parse_ascii_int<T: std::str::FromStr>(text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| Error::ProtocolValueError(format!("invalid integer text value: {text:?}")))
}

impl FieldType for i16 {
    fn is_compatible(server_oid: i32) -> bool {
        server_oid == oid::INT2
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        parse_ascii_int(text)
    }

    fn parse_binary(_server_oid: i32, bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 2] = bytes
            .try_into()
            .map_err(|_| Error::ProtocolValueError(format!("invalid int2 length: {}", bytes.len())))?;
        Ok(i16::from_be_bytes(arr))
    }
}

impl Encode for i16 {
    const OID: i32 = oid::INT2;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        let mut tmp = itoa::Buffer::new();
        buf.extend_from_slice(tmp.format(*self).as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl FieldType for i32 {
    fn is_compatible(server_oid: i32) -> bool {
        matches!(server_oid, oid::INT2 | oid::INT4)
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        parse_ascii_int(text)
    }

    fn parse_binary(server_oid: i32, bytes: &[u8]) -> Result<Self> {
        match server_oid {
            oid::INT2 => i16::parse_binary(server_oid, bytes).map(i32::from),
            _ => {
                let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                    Error::ProtocolValueError(format!("invalid int4 length: {}", bytes.len()))
                })?;
                Ok(i32::from_be_bytes(arr))
            }
        }
    }
}

impl Encode for i32 {
    const OID: i32 = oid::INT4;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        let mut tmp = itoa::Buffer::new();
        buf.extend_from_slice(tmp.format(*self).as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl FieldType for i64 {
    fn is_compatible(server_oid: i32) -> bool {
        matches!(server_oid, oid::INT2 | oid::INT4 | oid::INT8)
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        parse_ascii_int(text)
    }

    fn parse_binary(server_oid: i32, bytes: &[u8]) -> Result<Self> {
        match server_oid {
            oid::INT2 => i16::parse_binary(server_oid, bytes).map(i64::from),
            oid::INT4 => i32::parse_binary(server_oid, bytes).map(i64::from),
            _ => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    Error::ProtocolValueError(format!("invalid int8 length: {}", bytes.len()))
                })?;
                Ok(i64::from_be_bytes(arr))
            }
        }
    }
}

impl Encode for i64 {
    const OID: i32 = oid::INT8;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        let mut tmp = itoa::Buffer::new();
        buf.extend_from_slice(tmp.format(*self).as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}
