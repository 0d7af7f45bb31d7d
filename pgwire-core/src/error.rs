//! Flat error taxonomy plus a diagnostics side-channel mirroring the fields of a
//! Postgres `ErrorResponse` / `NoticeResponse`.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A structured error payload mirroring the fields of a Postgres `ErrorResponse`.
///
/// Every field is optional because the server is free to omit all but
/// `severity`, `sqlstate` and `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub severity: Option<String>,
    pub sqlstate: Option<String>,
    pub message: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<String>,
    pub internal_position: Option<String>,
    pub internal_query: Option<String>,
    pub where_: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub data_type_name: Option<String>,
    pub constraint_name: Option<String>,
    pub file_name: Option<String>,
    pub line_number: Option<String>,
    pub routine: Option<String>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.severity, &self.sqlstate, &self.message) {
            (Some(sev), Some(code), Some(msg)) => write!(f, "{sev} ({code}): {msg}"),
            (_, _, Some(msg)) => write!(f, "{msg}"),
            _ => write!(f, "<no diagnostics>"),
        }
    }
}

/// The flat error-code enum described by the protocol error taxonomy.
///
/// Every variant may carry a [`Diagnostics`] payload; on framing/codec errors
/// it is always `None`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- framing / codec ---
    #[error("incomplete message: need {needed} more byte(s)")]
    IncompleteMessage { needed: usize },

    #[error("extra bytes after parsing a well-formed message")]
    ExtraBytes,

    #[error("protocol value error: {0}")]
    ProtocolValueError(String),

    #[error("value too big to encode: {0}")]
    ValueTooBig(String),

    // --- authentication ---
    #[error("authentication failed{}", diag_suffix(.0))]
    AuthFailed(Option<Diagnostics>),

    #[error("Kerberos V5 authentication is not supported")]
    AuthKerberosV5Unsupported,

    #[error("cleartext password authentication is disallowed by policy")]
    AuthCleartextPasswordUnsupported,

    #[error("MD5 password authentication is disallowed by policy")]
    AuthMd5PasswordUnsupported,

    #[error("GSSAPI authentication is not supported")]
    AuthGssUnsupported,

    #[error("SSPI authentication is not supported")]
    AuthSspiUnsupported,

    #[error("no supported SASL mechanism was offered by the server")]
    AuthSaslUnsupported,

    #[error("server requires a mandatory SCRAM extension this client does not support")]
    MandatoryScramExtensionNotSupported,

    #[error("invalid SCRAM message: {0}")]
    InvalidScramMessage(String),

    #[error("invalid base64 data")]
    InvalidBase64,

    // --- execution ---
    #[error("server error{}", diag_suffix(.0))]
    ExecServerError(Option<Diagnostics>),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("incompatible response type: {0}")]
    IncompatibleResponseType(String),

    #[error("incompatible response length: more messages than expected handlers")]
    IncompatibleResponseLength,

    // --- typing ---
    #[error("incompatible type for field {field}: server oid {server_oid} is not accepted")]
    IncompatibleType { field: String, server_oid: i32 },

    #[error("unexpected null in field {field}")]
    UnexpectedNull { field: String },
}

fn diag_suffix(diag: &Option<Diagnostics>) -> String {
    match diag {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

impl Error {
    /// The diagnostics payload carried by this error, if any.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Error::AuthFailed(d) | Error::ExecServerError(d) => d.as_ref(),
            _ => None,
        }
    }
}
