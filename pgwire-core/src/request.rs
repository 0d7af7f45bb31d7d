//! C6: request builder — assembles one or more frontend messages into a
//! single byte buffer, tracking how many `Sync` messages were emitted so the
//! response FSM (C7) knows how many `ReadyForQuery` replies to expect.
//!
//! Grounded on `nativepg/request.hpp` (`request::add_query` /
//! `add_prepare` / `add_execute` / `add_sync`, all appending into one
//! `buffer_`) and `nativepg/parameter_ref.hpp` (the type-erased parameter
//! abstraction, realized here as [`ParamRef`] over this crate's `Encode`
//! trait instead of a `void*` + function-pointer triple).

use crate::error::Result;
use crate::message::frontend::{self, DescribeTarget, FormatCode};
use crate::types::Encode;

/// Object-safe half of [`Encode`], used to erase the concrete parameter type
/// behind a `&dyn` reference inside [`ParamRef`].
trait EncodeErased {
    fn encode_text(&self, buf: &mut Vec<u8>);
    fn encode_binary(&self, buf: &mut Vec<u8>);
}

impl<T: Encode> EncodeErased for T {
    fn encode_text(&self, buf: &mut Vec<u8>) {
        Encode::encode_text(self, buf)
    }

    fn encode_binary(&self, buf: &mut Vec<u8>) {
        Encode::encode_binary(self, buf)
    }
}

enum ParamValue<'a> {
    Null,
    Value(&'a dyn EncodeErased),
}

/// A single type-erased query parameter: an OID, whether binary transfer is
/// available for it, and either a borrowed value or SQL NULL.
pub struct ParamRef<'a> {
    oid: i32,
    supports_binary: bool,
    value: ParamValue<'a>,
}

impl<'a> ParamRef<'a> {
    pub fn new<T: Encode>(value: &'a T) -> Self {
        ParamRef {
            oid: T::OID,
            supports_binary: T::SUPPORTS_BINARY,
            value: ParamValue::Value(value),
        }
    }

    pub fn null<T: Encode>() -> Self {
        ParamRef { oid: T::OID, supports_binary: T::SUPPORTS_BINARY, value: ParamValue::Null }
    }

    pub fn oid(&self) -> i32 {
        self.oid
    }

    fn supports_binary(&self) -> bool {
        self.supports_binary
    }

    fn is_null(&self) -> bool {
        matches!(self.value, ParamValue::Null)
    }

    fn encode(&self, format: FormatCode, buf: &mut Vec<u8>) {
        if let ParamValue::Value(v) = &self.value {
            match format {
                FormatCode::Text => v.encode_text(buf),
                FormatCode::Binary => v.encode_binary(buf),
            }
        }
    }
}

/// Picks binary iff every parameter supports it (§4.6's all-or-nothing
/// policy); an empty parameter list is vacuously binary (matches the
/// original's `all_of` over an empty range).
fn pick_format(params: &[ParamRef<'_>]) -> FormatCode {
    if params.iter().all(ParamRef::supports_binary) {
        FormatCode::Binary
    } else {
        FormatCode::Text
    }
}

/// Accumulates one or more frontend messages plus how many `Sync` messages
/// were emitted, so the response FSM (C7) can count down `ReadyForQuery`
/// replies.
#[derive(Debug, Default)]
pub struct Request {
    pub payload: Vec<u8>,
    pub sync_count: usize,
}

impl Request {
    pub fn new() -> Self {
        Request::default()
    }

    /// `Query(sql)`. The response is a sequence terminating in
    /// `ReadyForQuery`, same as one `Sync` would produce.
    pub fn add_simple_query(&mut self, sql: &str) -> Result<&mut Self> {
        frontend::query(sql, &mut self.payload)?;
        self.sync_count += 1;
        Ok(self)
    }

    /// `Parse{statement_name, sql, parameter_type_oids}`.
    pub fn add_prepare(
        &mut self,
        statement_name: &str,
        sql: &str,
        parameter_type_oids: &[i32],
    ) -> Result<&mut Self> {
        frontend::parse(statement_name, sql, parameter_type_oids, &mut self.payload)?;
        Ok(self)
    }

    /// `Bind + Describe(portal) + Execute(portal, max_rows=0) + Sync`.
    /// Parameter format is binary iff every parameter supports it (§4.6);
    /// `result_format` is the caller's choice for the returned columns.
    pub fn add_execute(
        &mut self,
        statement_name: &str,
        params: &[ParamRef<'_>],
        result_format: FormatCode,
    ) -> Result<&mut Self> {
        let param_format = pick_format(params);

        let mut encoded: Vec<Option<Vec<u8>>> = Vec::with_capacity(params.len());
        for param in params {
            if param.is_null() {
                encoded.push(None);
            } else {
                let mut buf = Vec::new();
                param.encode(param_format, &mut buf);
                encoded.push(Some(buf));
            }
        }
        let bound: Vec<frontend::BoundParam<'_>> =
            encoded.iter().map(|b| b.as_deref()).collect();

        frontend::bind(
            /* portal_name */ "",
            statement_name,
            param_format,
            &bound,
            result_format,
            &mut self.payload,
        )?;
        frontend::describe(DescribeTarget::Portal, "", &mut self.payload)?;
        frontend::execute("", 0, &mut self.payload)?;
        frontend::sync(&mut self.payload)?;
        self.sync_count += 1;
        Ok(self)
    }

    /// Anonymous prepare + execute: `Parse("", sql) + Bind + Describe +
    /// Execute + Sync`.
    pub fn add_query(
        &mut self,
        sql: &str,
        params: &[ParamRef<'_>],
        result_format: FormatCode,
    ) -> Result<&mut Self> {
        self.add_prepare("", sql, &[])?;
        self.add_execute("", params, result_format)?;
        Ok(self)
    }

    pub fn add_sync(&mut self) -> Result<&mut Self> {
        frontend::sync(&mut self.payload)?;
        self.sync_count += 1;
        Ok(self)
    }

    pub fn add_flush(&mut self) -> Result<&mut Self> {
        frontend::flush(&mut self.payload)?;
        Ok(self)
    }

    pub fn add_close(&mut self, target: DescribeTarget, name: &str) -> Result<&mut Self> {
        frontend::close(target, name, &mut self.payload)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_query_counts_one_sync() {
        let mut req = Request::new();
        req.add_simple_query("select 1;").unwrap();
        assert_eq!(req.sync_count, 1);
        assert_eq!(req.payload[0], b'Q');
    }

    #[test]
    fn add_query_emits_parse_bind_describe_execute_sync() {
        let mut req = Request::new();
        let one = 1i32;
        req.add_query("select $1", &[ParamRef::new(&one)], FormatCode::Text).unwrap();
        assert_eq!(req.sync_count, 1);
        let tags: Vec<u8> = {
            let mut tags = Vec::new();
            let mut i = 0;
            while i < req.payload.len() {
                let tag = req.payload[i];
                tags.push(tag);
                let len = i32::from_be_bytes(req.payload[i + 1..i + 5].try_into().unwrap()) as usize;
                i += 1 + len;
            }
            tags
        };
        assert_eq!(tags, vec![b'P', b'B', b'D', b'E', b'S']);
    }

    #[test]
    fn all_parameters_binary_picks_binary_format() {
        let one = 1i32;
        let two = 2i32;
        assert_eq!(
            pick_format(&[ParamRef::new(&one), ParamRef::new(&two)]),
            FormatCode::Binary
        );
    }

    #[test]
    fn empty_parameter_list_is_vacuously_binary() {
        assert_eq!(pick_format(&[]), FormatCode::Binary);
    }

    #[test]
    fn null_parameter_encodes_as_minus_one_length() {
        let mut req = Request::new();
        req.add_execute("", &[ParamRef::null::<i32>()], FormatCode::Text).unwrap();
        // Bind message: tag 'B', len(4), portal\0, stmt\0, i16 fmt-count,
        // i16 fmt, i16 param-count, i32 len(-1 for null)...
        assert!(req.payload.windows(4).any(|w| w == (-1i32).to_be_bytes()));
    }
}
