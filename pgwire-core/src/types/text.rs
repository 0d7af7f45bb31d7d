//! `text`/`varchar`/`bpchar`-like columns (oids 25/1043/1042), decoded into
//! `String`. Text and binary wire formats coincide for these types (both are
//! just the column's bytes, which Postgres guarantees are valid UTF-8 under
//! the server's encoding), so `parse_binary` reuses `parse_text`.
//!
//! Grounded on `nativepg/field_traits.hpp`'s string-like `field_is_compatible`
//! specialization: unlike the numeric ladder, a `String` target accepts *any*
//! server OID, since any column can be asked for in its text representation.
//! `sqlx-core/src/postgres/types/str.rs` supplies the `Encode`/OID choice.

use super::{oid, FieldType};
use crate::error::{Error, Result};
use crate::types::Encode;
use std::str;

impl FieldType for String {
    fn is_compatible(_server_oid: i32) -> bool {
        true
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        Ok(text.to_owned())
    }

    fn parse_binary(_server_oid: i32, bytes: &[u8]) -> Result<Self> {
        str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| Error::ProtocolValueError("invalid utf-8 in text column".to_string()))
    }
}

impl Encode for String {
    const OID: i32 = oid::TEXT;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Encode for &str {
    const OID: i32 = oid::TEXT;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_any_oid() {
        assert!(String::is_compatible(oid::INT4));
        assert!(String::is_compatible(oid::UUID));
        assert!(String::is_compatible(oid::VARCHAR));
    }

    #[test]
    fn text_and_binary_agree() {
        let bytes = b"hello world";
        assert_eq!(
            String::parse_text(oid::TEXT, "hello world").unwrap(),
            String::parse_binary(oid::TEXT, bytes).unwrap(),
        );
    }

    #[test]
    fn binary_rejects_invalid_utf8() {
        assert!(String::parse_binary(oid::TEXT, &[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn encode_is_utf8_bytes() {
        let mut buf = Vec::new();
        "abc".to_string().encode_text(&mut buf);
        assert_eq!(buf, b"abc".to_vec());
    }
}
