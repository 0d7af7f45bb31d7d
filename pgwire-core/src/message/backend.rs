//! Backend message tags and their payload parsers (C1).
//!
//! Grounded on `postgres/protocol/message.rs` (the tag set and its
//! `TryFrom<u8>`), `postgres/protocol/row_description.rs` (RowDescription /
//! Field parse loop), `postgres/message/{authentication.rs,response.rs}`
//! (Authentication sub-messages, ErrorResponse/NoticeResponse field
//! iterator), `nativepg/wire/messages.hpp` (backend_key_data,
//! command_complete, empty_query_response), and `nativepg/protocol/copy.hpp`
//! (the COPY message shapes, §4.10 of SPEC_FULL.md).

use crate::error::{Error, Result};
use crate::io::Reader;
use crate::message::views::{Cell, ForwardView, RandomAccessView};

/// The closed set of backend message tags this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTag {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    CopyInResponse,
    CopyOutResponse,
    CopyBothResponse,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
    CopyData,
    CopyDone,
}

impl TryFrom<u8> for BackendTag {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        use BackendTag::*;
        Ok(match tag {
            b'R' => Authentication,
            b'K' => BackendKeyData,
            b'2' => BindComplete,
            b'3' => CloseComplete,
            b'C' => CommandComplete,
            b'G' => CopyInResponse,
            b'H' => CopyOutResponse,
            b'W' => CopyBothResponse,
            b'D' => DataRow,
            b'I' => EmptyQueryResponse,
            b'E' => ErrorResponse,
            b'v' => NegotiateProtocolVersion,
            b'n' => NoData,
            b'N' => NoticeResponse,
            b'A' => NotificationResponse,
            b't' => ParameterDescription,
            b'S' => ParameterStatus,
            b'1' => ParseComplete,
            b's' => PortalSuspended,
            b'Z' => ReadyForQuery,
            b'T' => RowDescription,
            b'd' => CopyData,
            b'c' => CopyDone,
            other => return Err(Error::ProtocolValueError(format!("unknown backend message tag: {other:?}"))),
        })
    }
}

#[derive(Debug, Clone)]
pub enum Authentication<'a> {
    Ok,
    KerberosV5,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Gss,
    GssContinue(&'a [u8]),
    Sspi,
    Sasl(&'a [u8]),
    SaslContinue(&'a [u8]),
    SaslFinal(&'a [u8]),
}

impl<'a> Authentication<'a> {
    /// Iterates the NUL-separated SASL mechanism names offered by the server.
    ///
    /// Only meaningful for [`Authentication::Sasl`]; grounded on
    /// `postgres/message/authentication.rs::SaslMechanisms`.
    pub fn sasl_mechanisms(data: &'a [u8]) -> impl Iterator<Item = &'a str> {
        let mut rest = data;
        std::iter::from_fn(move || {
            if rest.is_empty() || rest == [0] {
                return None;
            }
            let nul = memchr::memchr(0, rest)?;
            let (mech, tail) = rest.split_at(nul);
            rest = &tail[1..];
            std::str::from_utf8(mech).ok()
        })
    }
}

fn parse_authentication(body: &[u8]) -> Result<Authentication<'_>> {
    let mut r = Reader::new(body);
    let kind = r.get_i32()?;
    let msg = match kind {
        0 => Authentication::Ok,
        2 => Authentication::KerberosV5,
        3 => Authentication::CleartextPassword,
        5 => Authentication::Md5Password { salt: r.get_array::<4>()? },
        7 => Authentication::Gss,
        8 => Authentication::GssContinue(r.get_rest()),
        9 => Authentication::Sspi,
        10 => Authentication::Sasl(r.get_rest()),
        11 => Authentication::SaslContinue(r.get_rest()),
        12 => Authentication::SaslFinal(r.get_rest()),
        other => return Err(Error::ProtocolValueError(format!("unknown authentication method: {other}"))),
    };
    if !matches!(
        msg,
        Authentication::GssContinue(_) | Authentication::Sasl(_) | Authentication::SaslContinue(_) | Authentication::SaslFinal(_)
    ) {
        r.finish()?;
    }
    Ok(msg)
}

#[derive(Debug, Clone, Copy)]
pub struct BackendKeyData {
    pub process_id: i32,
    pub secret_key: i32,
}

fn parse_backend_key_data(body: &[u8]) -> Result<BackendKeyData> {
    let mut r = Reader::new(body);
    let process_id = r.get_i32()?;
    let secret_key = r.get_i32()?;
    r.finish()?;
    Ok(BackendKeyData { process_id, secret_key })
}

#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    pub tag: &'a str,
}

fn parse_command_complete(body: &[u8]) -> Result<CommandComplete<'_>> {
    let mut r = Reader::new(body);
    let tag = r.get_str_nul()?;
    r.finish()?;
    Ok(CommandComplete { tag })
}

/// A single, named, typed column description within a `RowDescription`.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescription<'a> {
    pub name: &'a str,
    pub table_oid: i32,
    pub column_attr: i16,
    pub type_oid: i32,
    pub type_len: i16,
    pub type_mod: i32,
    pub format: i16,
}

fn parse_field_description<'a>(r: &mut Reader<'a>) -> Result<FieldDescription<'a>> {
    Ok(FieldDescription {
        name: r.get_str_nul()?,
        table_oid: r.get_i32()?,
        column_attr: r.get_i16()?,
        type_oid: r.get_i32()?,
        type_len: r.get_i16()?,
        type_mod: r.get_i32()?,
        format: r.get_i16()?,
    })
}

#[derive(Debug)]
pub struct RowDescription<'a> {
    pub fields: ForwardView<'a, FieldDescription<'a>>,
}

fn parse_row_description(body: &[u8]) -> Result<RowDescription<'_>> {
    let mut r = Reader::new(body);
    let count = r.get_i16()?;
    if count < 0 {
        return Err(Error::ProtocolValueError("negative field count".into()));
    }
    let rest = r.get_rest();
    let fields = ForwardView::scan(rest, count as usize, parse_field_description)?;
    Ok(RowDescription { fields })
}

#[derive(Debug)]
pub struct ParameterDescription<'a> {
    pub type_oids: RandomAccessView<'a, i32>,
}

fn parse_parameter_description(body: &[u8]) -> Result<ParameterDescription<'_>> {
    let mut r = Reader::new(body);
    let count = r.get_i16()?;
    if count < 0 {
        return Err(Error::ProtocolValueError("negative parameter count".into()));
    }
    let rest = r.get_rest();
    let type_oids = RandomAccessView::new(rest, count as usize, 4, |b| {
        i32::from_be_bytes([b[0], b[1], b[2], b[3]])
    })?;
    Ok(ParameterDescription { type_oids })
}

#[derive(Debug)]
pub struct DataRow<'a> {
    pub columns: ForwardView<'a, Cell<'a>>,
}

fn parse_data_row_cell<'a>(r: &mut Reader<'a>) -> Result<Cell<'a>> {
    let len = r.get_i32()?;
    if len < 0 {
        return Ok(None);
    }
    Ok(Some(r.get_bytes(len as usize)?))
}

fn parse_data_row(body: &[u8]) -> Result<DataRow<'_>> {
    let mut r = Reader::new(body);
    let count = r.get_i16()?;
    if count < 0 {
        return Err(Error::ProtocolValueError("negative column count".into()));
    }
    let rest = r.get_rest();
    let columns = ForwardView::scan(rest, count as usize, parse_data_row_cell)?;
    Ok(DataRow { columns })
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterStatus<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

fn parse_parameter_status(body: &[u8]) -> Result<ParameterStatus<'_>> {
    let mut r = Reader::new(body);
    let name = r.get_str_nul()?;
    let value = r.get_str_nul()?;
    r.finish()?;
    Ok(ParameterStatus { name, value })
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationResponse<'a> {
    pub process_id: i32,
    pub channel: &'a str,
    pub payload: &'a str,
}

fn parse_notification_response(body: &[u8]) -> Result<NotificationResponse<'_>> {
    let mut r = Reader::new(body);
    let process_id = r.get_i32()?;
    let channel = r.get_str_nul()?;
    let payload = r.get_str_nul()?;
    r.finish()?;
    Ok(NotificationResponse { process_id, channel, payload })
}

#[derive(Debug)]
pub struct NegotiateProtocolVersion<'a> {
    pub newest_minor_protocol: i32,
    pub unrecognized_options: ForwardView<'a, &'a str>,
}

fn parse_negotiate_protocol_version(body: &[u8]) -> Result<NegotiateProtocolVersion<'_>> {
    let mut r = Reader::new(body);
    let newest_minor_protocol = r.get_i32()?;
    let count = r.get_i32()?;
    if count < 0 {
        return Err(Error::ProtocolValueError("negative option count".into()));
    }
    let rest = r.get_rest();
    let unrecognized_options = ForwardView::scan(rest, count as usize, |r| r.get_str_nul())?;
    Ok(NegotiateProtocolVersion { newest_minor_protocol, unrecognized_options })
}

/// Transaction status reported by `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InTransaction,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    pub status: TransactionStatus,
}

fn parse_ready_for_query(body: &[u8]) -> Result<ReadyForQuery> {
    let mut r = Reader::new(body);
    let status = match r.get_u8()? {
        b'I' => TransactionStatus::Idle,
        b'T' => TransactionStatus::InTransaction,
        b'E' => TransactionStatus::Failed,
        other => return Err(Error::ProtocolValueError(format!("unknown transaction status: {other:?}"))),
    };
    r.finish()?;
    Ok(ReadyForQuery { status })
}

/// The field set of an `ErrorResponse` / `NoticeResponse`, decoded from the
/// `{1-byte field kind, NUL-terminated string}*` sequence. Unknown field
/// kinds are silently skipped, per §4.1.
///
/// Grounded on `postgres/message/response.rs::Response`, generalized to
/// retain every field (the teacher only caches severity/message/code; this
/// crate's [`crate::error::Diagnostics`] needs the full set).
#[derive(Debug, Clone, Default)]
pub struct NoticeFields<'a> {
    pub severity: Option<&'a str>,
    pub sqlstate: Option<&'a str>,
    pub message: Option<&'a str>,
    pub detail: Option<&'a str>,
    pub hint: Option<&'a str>,
    pub position: Option<&'a str>,
    pub internal_position: Option<&'a str>,
    pub internal_query: Option<&'a str>,
    pub where_: Option<&'a str>,
    pub schema_name: Option<&'a str>,
    pub table_name: Option<&'a str>,
    pub column_name: Option<&'a str>,
    pub data_type_name: Option<&'a str>,
    pub constraint_name: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub line_number: Option<&'a str>,
    pub routine: Option<&'a str>,
}

fn parse_notice_fields(body: &[u8]) -> Result<NoticeFields<'_>> {
    let mut r = Reader::new(body);
    let mut out = NoticeFields::default();
    loop {
        let kind = r.get_u8()?;
        if kind == 0 {
            break;
        }
        let value = r.get_str_nul()?;
        match kind {
            b'S' => out.severity = Some(value),
            b'C' => out.sqlstate = Some(value),
            b'M' => out.message = Some(value),
            b'D' => out.detail = Some(value),
            b'H' => out.hint = Some(value),
            b'P' => out.position = Some(value),
            b'p' => out.internal_position = Some(value),
            b'q' => out.internal_query = Some(value),
            b'W' => out.where_ = Some(value),
            b's' => out.schema_name = Some(value),
            b't' => out.table_name = Some(value),
            b'c' => out.column_name = Some(value),
            b'd' => out.data_type_name = Some(value),
            b'n' => out.constraint_name = Some(value),
            b'F' => out.file_name = Some(value),
            b'L' => out.line_number = Some(value),
            b'R' => out.routine = Some(value),
            _ => {} // unknown field kinds are silently skipped
        }
    }
    r.finish()?;
    Ok(out)
}

impl<'a> From<NoticeFields<'a>> for crate::error::Diagnostics {
    fn from(f: NoticeFields<'a>) -> Self {
        crate::error::Diagnostics {
            severity: f.severity.map(String::from),
            sqlstate: f.sqlstate.map(String::from),
            message: f.message.map(String::from),
            detail: f.detail.map(String::from),
            hint: f.hint.map(String::from),
            position: f.position.map(String::from),
            internal_position: f.internal_position.map(String::from),
            internal_query: f.internal_query.map(String::from),
            where_: f.where_.map(String::from),
            schema_name: f.schema_name.map(String::from),
            table_name: f.table_name.map(String::from),
            column_name: f.column_name.map(String::from),
            data_type_name: f.data_type_name.map(String::from),
            constraint_name: f.constraint_name.map(String::from),
            file_name: f.file_name.map(String::from),
            line_number: f.line_number.map(String::from),
            routine: f.routine.map(String::from),
        }
    }
}

/// `CopyInResponse` / `CopyOutResponse` / `CopyBothResponse` (§4.10).
#[derive(Debug)]
pub struct CopyResponse<'a> {
    pub overall_format: u8,
    pub column_formats: RandomAccessView<'a, i16>,
}

fn parse_copy_response(body: &[u8]) -> Result<CopyResponse<'_>> {
    let mut r = Reader::new(body);
    let overall_format = r.get_u8()?;
    let count = r.get_i16()?;
    if count < 0 {
        return Err(Error::ProtocolValueError("negative column count".into()));
    }
    let rest = r.get_rest();
    let column_formats = RandomAccessView::new(rest, count as usize, 2, |b| {
        i16::from_be_bytes([b[0], b[1]])
    })?;
    Ok(CopyResponse { overall_format, column_formats })
}

/// `CopyData` (§4.10): an opaque payload, no further structure assumed.
#[derive(Debug, Clone, Copy)]
pub struct CopyData<'a> {
    pub data: &'a [u8],
}

fn parse_copy_data(body: &[u8]) -> Result<CopyData<'_>> {
    Ok(CopyData { data: body })
}

/// The full backend message union (§3 "Backend message").
#[derive(Debug)]
pub enum BackendMessage<'a> {
    Authentication(Authentication<'a>),
    BackendKeyData(BackendKeyData),
    BindComplete,
    CloseComplete,
    CommandComplete(CommandComplete<'a>),
    CopyInResponse(CopyResponse<'a>),
    CopyOutResponse(CopyResponse<'a>),
    CopyBothResponse(CopyResponse<'a>),
    CopyData(CopyData<'a>),
    CopyDone,
    DataRow(DataRow<'a>),
    EmptyQueryResponse,
    ErrorResponse(NoticeFields<'a>),
    NegotiateProtocolVersion(NegotiateProtocolVersion<'a>),
    NoData,
    NoticeResponse(NoticeFields<'a>),
    NotificationResponse(NotificationResponse<'a>),
    ParameterDescription(ParameterDescription<'a>),
    ParameterStatus(ParameterStatus<'a>),
    ParseComplete,
    PortalSuspended,
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription<'a>),
}

impl<'a> BackendMessage<'a> {
    pub fn tag(&self) -> &'static str {
        match self {
            BackendMessage::Authentication(_) => "Authentication",
            BackendMessage::BackendKeyData(_) => "BackendKeyData",
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::CloseComplete => "CloseComplete",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::CopyInResponse(_) => "CopyInResponse",
            BackendMessage::CopyOutResponse(_) => "CopyOutResponse",
            BackendMessage::CopyBothResponse(_) => "CopyBothResponse",
            BackendMessage::CopyData(_) => "CopyData",
            BackendMessage::CopyDone => "CopyDone",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NegotiateProtocolVersion(_) => "NegotiateProtocolVersion",
            BackendMessage::NoData => "NoData",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
            BackendMessage::NotificationResponse(_) => "NotificationResponse",
            BackendMessage::ParameterDescription(_) => "ParameterDescription",
            BackendMessage::ParameterStatus(_) => "ParameterStatus",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::PortalSuspended => "PortalSuspended",
            BackendMessage::ReadyForQuery(_) => "ReadyForQuery",
            BackendMessage::RowDescription(_) => "RowDescription",
        }
    }
}

/// Parses one backend message body given its already-decoded tag.
///
/// This is the dispatch table referenced by the framing FSM (C2). `body`
/// must be exactly the payload bytes (header stripped).
pub fn parse<'a>(tag: BackendTag, body: &'a [u8]) -> Result<BackendMessage<'a>> {
    use BackendTag::*;
    Ok(match tag {
        Authentication => BackendMessage::Authentication(parse_authentication(body)?),
        BackendKeyData => BackendMessage::BackendKeyData(parse_backend_key_data(body)?),
        BindComplete => {
            Reader::new(body).finish()?;
            BackendMessage::BindComplete
        }
        CloseComplete => {
            Reader::new(body).finish()?;
            BackendMessage::CloseComplete
        }
        CommandComplete => BackendMessage::CommandComplete(parse_command_complete(body)?),
        CopyInResponse => BackendMessage::CopyInResponse(parse_copy_response(body)?),
        CopyOutResponse => BackendMessage::CopyOutResponse(parse_copy_response(body)?),
        CopyBothResponse => BackendMessage::CopyBothResponse(parse_copy_response(body)?),
        DataRow => BackendMessage::DataRow(parse_data_row(body)?),
        EmptyQueryResponse => {
            Reader::new(body).finish()?;
            BackendMessage::EmptyQueryResponse
        }
        ErrorResponse => BackendMessage::ErrorResponse(parse_notice_fields(body)?),
        NegotiateProtocolVersion => BackendMessage::NegotiateProtocolVersion(parse_negotiate_protocol_version(body)?),
        NoData => {
            Reader::new(body).finish()?;
            BackendMessage::NoData
        }
        NoticeResponse => BackendMessage::NoticeResponse(parse_notice_fields(body)?),
        NotificationResponse => BackendMessage::NotificationResponse(parse_notification_response(body)?),
        ParameterDescription => BackendMessage::ParameterDescription(parse_parameter_description(body)?),
        ParameterStatus => BackendMessage::ParameterStatus(parse_parameter_status(body)?),
        ParseComplete => {
            Reader::new(body).finish()?;
            BackendMessage::ParseComplete
        }
        PortalSuspended => {
            Reader::new(body).finish()?;
            BackendMessage::PortalSuspended
        }
        ReadyForQuery => BackendMessage::ReadyForQuery(parse_ready_for_query(body)?),
        RowDescription => BackendMessage::RowDescription(parse_row_description(body)?),
        CopyData => BackendMessage::CopyData(parse_copy_data(body)?),
        CopyDone => {
            Reader::new(body).finish()?;
            BackendMessage::CopyDone
        }
    })
}
