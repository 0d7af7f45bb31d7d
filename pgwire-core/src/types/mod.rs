//! C4: built-in type codec — OID constants, widening-aware `accepts`, and
//! text/binary encode/decode for the baseline scalar types.
//!
//! Grounded on `sqlx-core/src/postgres/types/{bool,int}.rs` for the
//! `Encode`/`Decode` split and big-endian binary layout, and on
//! `nativepg/field_traits.hpp` (`field_is_compatible<T>`, `field_parse<T>`)
//! for the "read may widen, never narrow" rule: a field declared `int4` or
//! `int8` on the wire may be read into a Rust `i64`, but a `int8` column can
//! never be read into an `i32`.

pub mod boolean;
pub mod float;
pub mod int;
pub mod text;
pub mod uuid;

use crate::error::{Error, Result};

/// Well-known OIDs for the builtin types this crate understands (§4.4 /
/// §4.8). Not exhaustive of Postgres's builtin catalog; widening beyond
/// these requires `FieldType` to be implemented for a new Rust type.
pub mod oid {
    pub const BOOL: i32 = 16;
    pub const INT8: i32 = 20;
    pub const INT2: i32 = 21;
    pub const INT4: i32 = 23;
    pub const TEXT: i32 = 25;
    pub const FLOAT4: i32 = 700;
    pub const FLOAT8: i32 = 701;
    pub const VARCHAR: i32 = 1043;
    pub const BPCHAR: i32 = 1042;
    pub const UUID: i32 = 2950;
}

/// Implemented by every Rust type the row mapper (C8) can decode a column
/// into. `is_compatible`/`parse_text`/`parse_binary` all take the OID the
/// server actually reported for the column (from `FieldDescription`), since
/// decoding an `i32` out of an `int2` column needs to know it is reading a
/// 2-byte value, not a 4-byte one.
pub trait FieldType: Sized {
    /// True if a column the server describes with `server_oid` can be read
    /// into `Self` without truncation. Implementations widen (e.g. `i64`
    /// accepts `int2`/`int4`/`int8`) but never narrow.
    fn is_compatible(server_oid: i32) -> bool;

    fn parse_text(server_oid: i32, text: &str) -> Result<Self>;

    fn parse_binary(server_oid: i32, bytes: &[u8]) -> Result<Self>;

    /// Called instead of `parse_text`/`parse_binary` when the column's cell
    /// is SQL NULL (§4.7: "absent → `unexpected_null` unless the target
    /// admits null"). Every builtin type rejects it; only `Option<T>`
    /// admits null, by construction here rather than by a marker flag.
    fn from_null() -> Result<Self> {
        Err(Error::UnexpectedNull { field: String::new() })
    }
}

/// A column declared `Option<T>` admits SQL NULL: absent cells decode to
/// `None`, present ones defer to `T`. Grounded on
/// `ariaandika-postro/postro/src/row.rs::impl<T: Decode> Decode for
/// Option<T>` (`column.is_null()` branching to `None`/`Some(decode)`),
/// adapted to this crate's "caller already knows null-ness before parsing"
/// split between [`FieldType::from_null`] and `parse_text`/`parse_binary`.
impl<T: FieldType> FieldType for Option<T> {
    fn is_compatible(server_oid: i32) -> bool {
        T::is_compatible(server_oid)
    }

    fn parse_text(server_oid: i32, text: &str) -> Result<Self> {
        T::parse_text(server_oid, text).map(Some)
    }

    fn parse_binary(server_oid: i32, bytes: &[u8]) -> Result<Self> {
        T::parse_binary(server_oid, bytes).map(Some)
    }

    fn from_null() -> Result<Self> {
        Ok(None)
    }
}

/// Implemented by every Rust type that can be bound as a query parameter
/// (C6). Unlike `FieldType`, encoding always targets exactly one OID: the
/// type of the parameter is dictated by the caller, not widened.
pub trait Encode {
    const OID: i32;

    /// Whether [`Encode::encode_binary`] produces a value the server accepts
    /// in binary format for this type. Every builtin type in this crate does;
    /// the flag exists so the request builder's all-or-nothing binary policy
    /// (§4.6) can fall back to text when a future `Encode` impl can't.
    ///
    /// Grounded on `nativepg/parameter_ref.hpp::detail::supports_binary<T>`.
    const SUPPORTS_BINARY: bool = true;

    fn encode_text(&self, buf: &mut Vec<u8>);

    fn encode_binary(&self, buf: &mut Vec<u8>);
}

pub(crate) fn incompatible(field: &str, server_oid: i32) -> Error {
    Error::IncompatibleType {
        field: field.to_string(),
        server_oid,
    }
}
