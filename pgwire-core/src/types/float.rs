//! `float4`/`float8` (oids 700/701). Binary is IEEE-754 big-endian; text is
//! the usual decimal/scientific form Postgres emits for `real`/`double
//! precision`.
//!
//! Grounded on `sqlx-core/src/postgres/types/float.rs`: `f64` additionally
//! accepts a `float4`-typed column and widens it (mirroring the int ladder),
//! but a `f32` target never accepts `float8`.

use super::{oid, FieldType};
use crate::error::{Error, Result};
use crate::types::Encode;

fn parse_ascii_float<T: std::str::FromStr>(text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| Error::ProtocolValueError(format!("invalid float text value: {text:?}")))
}

impl FieldType for f32 {
    fn is_compatible(server_oid: i32) -> bool {
        server_oid == oid::FLOAT4
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        parse_ascii_float(text)
    }

    fn parse_binary(_server_oid: i32, bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 4] = bytes.try_into().map_err(|_| {
            Error::ProtocolValueError(format!("invalid float4 length: {}", bytes.len()))
        })?;
        Ok(f32::from_be_bytes(arr))
    }
}

impl Encode for f32 {
    const OID: i32 = oid::FLOAT4;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.to_string().as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl FieldType for f64 {
    fn is_compatible(server_oid: i32) -> bool {
        matches!(server_oid, oid::FLOAT4 | oid::FLOAT8)
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        parse_ascii_float(text)
    }

    fn parse_binary(server_oid: i32, bytes: &[u8]) -> Result<Self> {
        match server_oid {
            oid::FLOAT4 => f32::parse_binary(server_oid, bytes).map(f64::from),
            _ => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    Error::ProtocolValueError(format!("invalid float8 length: {}", bytes.len()))
                })?;
                Ok(f64::from_be_bytes(arr))
            }
        }
    }
}

impl Encode for f64 {
    const OID: i32 = oid::FLOAT8;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.to_string().as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_widens_from_float4_binary() {
        let v = f64::parse_binary(oid::FLOAT4, &1.5f32.to_be_bytes()).unwrap();
        assert_eq!(v, 1.5);
    }

    #[test]
    fn f32_rejects_float8_oid() {
        assert!(!f32::is_compatible(oid::FLOAT8));
    }

    #[test]
    fn text_round_trips() {
        assert_eq!(f64::parse_text(oid::FLOAT8, "3.25").unwrap(), 3.25);
    }

    #[test]
    fn encode_binary_is_big_endian() {
        let mut buf = Vec::new();
        1.0f32.encode_binary(&mut buf);
        assert_eq!(buf, 1.0f32.to_be_bytes().to_vec());
    }
}
