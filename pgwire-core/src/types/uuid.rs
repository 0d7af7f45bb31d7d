//! `uuid` (oid 2950). Binary is the 16 raw bytes; text is the canonical
//! 8-4-4-4-12 hyphenated hex form.
//!
//! Grounded on `sqlx-core/src/postgres/types/uuid.rs` for the OID and the
//! `Uuid::from_slice`/`as_bytes` round trip.

use super::{oid, FieldType};
use crate::error::{Error, Result};
use crate::types::Encode;
use ::uuid::Uuid;

impl FieldType for Uuid {
    fn is_compatible(server_oid: i32) -> bool {
        server_oid == oid::UUID
    }

    fn parse_text(_server_oid: i32, text: &str) -> Result<Self> {
        Uuid::parse_str(text)
            .map_err(|err| Error::ProtocolValueError(format!("invalid uuid text value: {err}")))
    }

    fn parse_binary(_server_oid: i32, bytes: &[u8]) -> Result<Self> {
        Uuid::from_slice(bytes)
            .map_err(|_| Error::ProtocolValueError(format!("invalid uuid length: {}", bytes.len())))
    }
}

impl Encode for Uuid {
    const OID: i32 = oid::UUID;

    fn encode_text(&self, buf: &mut Vec<u8>) {
        let mut tmp = Uuid::encode_buffer();
        buf.extend_from_slice(self.hyphenated().encode_lower(&mut tmp).as_bytes());
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}
