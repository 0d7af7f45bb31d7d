//! Frontend message serializers (C1).
//!
//! Grounded on `nativepg/request.hpp` (assembling frontend messages into one
//! growing buffer) and the teacher's `io/buf_mut.rs` (`put_str_nul`-style
//! length-prefixed encoding idiom). Every message here is type-prefixed
//! except `StartupMessage`, `CancelRequest` and `SSLRequest`, which the
//! protocol defines without a leading tag byte.

use crate::error::Result;
use crate::io::{with_length_prefix, BufMutExt};

pub const PROTOCOL_MAJOR: i16 = 3;
pub const PROTOCOL_MINOR: i16 = 0;

/// `StartupMessage`: `{length, protocol_version, (key NUL value NUL)*, NUL}`.
/// `user` is mandatory; `params` may add e.g. `database`, `application_name`.
pub fn startup_message(user: &str, params: &[(&str, &str)], buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, None, |b| {
        b.put_i16(PROTOCOL_MAJOR);
        b.put_i16(PROTOCOL_MINOR);
        b.put_str_nul("user");
        b.put_str_nul(user);
        for (k, v) in params {
            b.put_str_nul(k);
            b.put_str_nul(v);
        }
        b.put_u8(0);
        Ok(())
    })
}

/// `CancelRequest = {length=16, 1234*65536+5678, pid, secret}`.
pub fn cancel_request(process_id: i32, secret_key: i32, buf: &mut Vec<u8>) {
    buf.put_i32(16);
    buf.put_i32(80877102); // 1234 << 16 | 5678
    buf.put_i32(process_id);
    buf.put_i32(secret_key);
}

/// `SSLRequest = {length=8, 80877103}`. Serialize-only; no negotiation FSM
/// lives in this crate (SSL/TLS is explicitly out of scope per §1).
pub fn ssl_request(buf: &mut Vec<u8>) {
    buf.put_i32(8);
    buf.put_i32(80877103);
}

pub fn password_message(password: &str, buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'p'), |b| {
        b.put_str_nul(password);
        Ok(())
    })
}

/// Raw SASL initial response: `{mechanism NUL, i32 len, bytes}` (len = -1 if
/// no initial data).
pub fn sasl_initial_response(mechanism: &str, initial_response: &[u8], buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'p'), |b| {
        b.put_str_nul(mechanism);
        b.put_i32(initial_response.len() as i32);
        b.put_bytes(initial_response);
        Ok(())
    })
}

/// Raw SASL response (client-final-message etc): just the raw bytes, no
/// length-prefixed sub-field (unlike the initial response).
pub fn sasl_response(data: &[u8], buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'p'), |b| {
        b.put_bytes(data);
        Ok(())
    })
}

pub fn query(sql: &str, buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'Q'), |b| {
        b.put_str_nul(sql);
        Ok(())
    })
}

/// `Parse{statement_name, sql, parameter_type_oids}`.
pub fn parse(statement_name: &str, sql: &str, parameter_type_oids: &[i32], buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'P'), |b| {
        b.put_str_nul(statement_name);
        b.put_str_nul(sql);
        b.put_i16(parameter_type_oids.len() as i16);
        for oid in parameter_type_oids {
            b.put_i32(*oid);
        }
        Ok(())
    })
}

/// Format code for a parameter or result column: `{0 = text, 1 = binary}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCode {
    Text,
    Binary,
}

impl FormatCode {
    fn as_i16(self) -> i16 {
        match self {
            FormatCode::Text => 0,
            FormatCode::Binary => 1,
        }
    }
}

/// One already-serialized bind parameter value, `None` meaning SQL NULL.
pub type BoundParam<'a> = Option<&'a [u8]>;

/// `Bind{portal_name, statement_name, parameter_format, parameters, result_format}`.
///
/// Per §4.4 the "all-or-nothing" binary policy means a single `param_format`
/// and a single `result_format` apply to every parameter/column.
#[allow(clippy::too_many_arguments)]
pub fn bind(
    portal_name: &str,
    statement_name: &str,
    param_format: FormatCode,
    params: &[BoundParam<'_>],
    result_format: FormatCode,
    buf: &mut Vec<u8>,
) -> Result<()> {
    with_length_prefix(buf, Some(b'B'), |b| {
        b.put_str_nul(portal_name);
        b.put_str_nul(statement_name);
        b.put_i16(1);
        b.put_i16(param_format.as_i16());
        b.put_i16(params.len() as i16);
        for param in params {
            match param {
                Some(bytes) => {
                    b.put_i32(bytes.len() as i32);
                    b.put_bytes(bytes);
                }
                None => b.put_i32(-1),
            }
        }
        b.put_i16(1);
        b.put_i16(result_format.as_i16());
        Ok(())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    Portal,
    Statement,
}

pub fn describe(target: DescribeTarget, name: &str, buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'D'), |b| {
        b.put_u8(match target {
            DescribeTarget::Portal => b'P',
            DescribeTarget::Statement => b'S',
        });
        b.put_str_nul(name);
        Ok(())
    })
}

/// `Execute{portal_name, max_rows}`; `max_rows = 0` means "no limit".
pub fn execute(portal_name: &str, max_rows: i32, buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'E'), |b| {
        b.put_str_nul(portal_name);
        b.put_i32(max_rows);
        Ok(())
    })
}

pub fn close(target: DescribeTarget, name: &str, buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'C'), |b| {
        b.put_u8(match target {
            DescribeTarget::Portal => b'P',
            DescribeTarget::Statement => b'S',
        });
        b.put_str_nul(name);
        Ok(())
    })
}

pub fn sync(buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'S'), |_| Ok(()))
}

pub fn flush(buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'H'), |_| Ok(()))
}

pub fn terminate(buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'X'), |_| Ok(()))
}

/// `CopyData` (§4.10): serialize-only, no orchestration of a COPY exchange.
pub fn copy_data(data: &[u8], buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'd'), |b| {
        b.put_bytes(data);
        Ok(())
    })
}

pub fn copy_done(buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'c'), |_| Ok(()))
}

pub fn copy_fail(message: &str, buf: &mut Vec<u8>) -> Result<()> {
    with_length_prefix(buf, Some(b'f'), |b| {
        b.put_str_nul(message);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_message_fixture_matches_spec() {
        let mut buf = Vec::new();
        startup_message("postgres", &[("database", "postgres")], &mut buf).unwrap();
        let expected: Vec<u8> = vec![
            0x00, 0x00, 0x00, 0x29, 0x00, 0x03, 0x00, 0x00, 0x75, 0x73, 0x65, 0x72, 0x00, 0x70,
            0x6F, 0x73, 0x74, 0x67, 0x72, 0x65, 0x73, 0x00, 0x64, 0x61, 0x74, 0x61, 0x62, 0x61,
            0x73, 0x65, 0x00, 0x70, 0x6F, 0x73, 0x74, 0x67, 0x72, 0x65, 0x73, 0x00, 0x00,
        ];
        assert_eq!(buf, expected);
    }

    #[test]
    fn simple_query_fixture_matches_spec() {
        let mut buf = Vec::new();
        query("select 1;", &mut buf).unwrap();
        let expected: Vec<u8> = vec![
            0x51, 0x00, 0x00, 0x00, 0x0E, 0x73, 0x65, 0x6C, 0x65, 0x63, 0x74, 0x20, 0x31, 0x3B,
            0x00,
        ];
        assert_eq!(buf, expected);
    }

    #[test]
    fn sync_is_five_bytes() {
        let mut buf = Vec::new();
        sync(&mut buf).unwrap();
        assert_eq!(buf, vec![b'S', 0x00, 0x00, 0x00, 0x04]);
    }
}
