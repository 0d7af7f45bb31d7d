//! `bool` (oid 16). Binary is a single byte, 0 or non-zero; text accepts the
//! server's canonical `t`/`f` plus the looser spellings Postgres itself
//! accepts on input (`true`/`1`, `false`/`0`).
//!
//! Grounded on `sqlx-core/src/postgres/types/bool.rs`.

use super::{oid, FieldType};
use crate::error::{Error, Result};
use crate::types::Encode;

impl FieldType for bool {
    fn is_compatible(server_oid: i32) -> bool {
        server_oid == oid::BOOL
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        match text {
            "t" | "true" | "1" => Ok(true),
            "f" | "false" | "0" => Ok(false),
            other => Err(Error::ProtocolValueError(format!(
                "invalid text bool value: {other:?}"
            ))),
        }
    }

    fn parse_binary(_server_oid: i32, bytes: &[u8]) -> Result<Self> {
        match bytes {
            [0] => Ok(false),
            [_] => Ok(true),
            _ => Err(Error::ProtocolValueError(format!(
                "invalid binary bool length: {}",
                bytes.len()
            ))),
        }
    }
}

impl Encode for bool {
    const OID: i32 = oid::BOOL;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        buf.push(if *self { b't' } else { b'f' });
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.push(if *self { 1 } else { 0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trips() {
        assert!(bool::parse_text(oid::BOOL, "t").unwrap());
        assert!(!bool::parse_text(oid::BOOL, "f").unwrap());
    }

    #[test]
    fn text_accepts_loose_spellings() {
        assert!(bool::parse_text(oid::BOOL, "true").unwrap());
        assert!(bool::parse_text(oid::BOOL, "1").unwrap());
        assert!(!bool::parse_text(oid::BOOL, "false").unwrap());
        assert!(!bool::parse_text(oid::BOOL, "0").unwrap());
    }

    #[test]
    fn binary_treats_any_nonzero_byte_as_true() {
        assert!(!bool::parse_binary(oid::BOOL, &[0]).unwrap());
        assert!(bool::parse_binary(oid::BOOL, &[1]).unwrap());
        assert!(bool::parse_binary(oid::BOOL, &[42]).unwrap());
    }

    #[test]
    fn rejects_foreign_oid() {
        assert!(!bool::is_compatible(oid::INT4));
    }
}
