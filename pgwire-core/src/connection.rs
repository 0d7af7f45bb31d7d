//! C9: connection driver — composes the stream FSM (C3), the startup/auth
//! FSM (C5) and the response FSM (C7) into a single entry point that reads
//! and writes actual bytes.
//!
//! Grounded on spec §4.9 directly plus the teacher's
//! `postgres/connection.rs::Postgres` composition (a connection owns a
//! stream plus `process_id`/`secret_key` and exposes a `startup`/`receive`
//! loop), generalized here to a [`Transport`] trait object instead of an
//! owned `async` `TcpStream`: this crate carries no runtime dependency
//! (§1), so the caller supplies blocking (or otherwise synchronous-looking)
//! read/write rather than this crate awaiting a socket itself.

use crate::auth::{StartupAction, StartupFsm, StartupParams, StartupSuccess};
use crate::crypto::CryptoProvider;
use crate::error::{Diagnostics, Error};
use crate::message::backend::BackendMessage;
use crate::message::frontend;
use crate::params::ConnectParams;
use crate::request::Request;
use crate::response::{ResponseAction, ResponseDriver, ResponseHandler};
use crate::stream::{Stream, StreamAction};

/// The byte-level transport a [`Connection`] drives. No TLS, pooling or
/// timeout handling lives here (non-goals, §1) — an implementation is free
/// to wrap a `TcpStream`, a `rustls` stream, or an in-memory pipe in tests.
pub trait Transport {
    /// Reads at least one byte into `buf`, returning the number read, or
    /// `Ok(0)` if the peer closed the connection.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;
}

/// Everything that can go wrong while driving a [`Connection`]: either the
/// protocol engine rejected something (`Error`), or the transport itself
/// failed. Kept separate from [`crate::error::Error`] because the engine's
/// state machines never touch a socket and so never produce I/O errors
/// themselves (§7) — only this outer driver does.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] Error),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

fn log_notice(diag: &Diagnostics) {
    let level = match diag.severity.as_deref() {
        Some("PANIC") | Some("FATAL") | Some("ERROR") => log::Level::Error,
        Some("WARNING") => log::Level::Warn,
        Some("DEBUG") => log::Level::Debug,
        // NOTICE, INFO, LOG, and anything the server invents, per §10.
        _ => log::Level::Info,
    };
    log::log!(target: "pgwire_core::notice", level, "{diag}");
}

/// A driven connection: the startup handshake has completed and the
/// connection is ready to [`Connection::execute`] requests.
pub struct Connection<T: Transport> {
    transport: T,
    stream: Stream,
    process_id: i32,
    secret_key: i32,
}

impl<T: Transport> Connection<T> {
    /// Performs the startup handshake (`StartupMessage` through whichever
    /// authentication the server demands) over `transport`.
    pub fn connect(transport: T, provider: &dyn CryptoProvider, params: &ConnectParams) -> Result<Self> {
        let mut conn = Connection { transport, stream: Stream::new(), process_id: 0, secret_key: 0 };

        let password = params.password.as_deref().unwrap_or("");
        let startup_params = StartupParams {
            user: &params.user,
            password,
            database: params.database.as_deref(),
            application_name: params.application_name.as_deref(),
            allow_cleartext_password: params.allow_cleartext_password,
            allow_md5_password: params.allow_md5_password,
        };

        let mut fsm = StartupFsm::new();
        let initial = fsm.begin(&startup_params)?;
        let success = conn.drive_startup(provider, &startup_params, fsm, initial)?;
        conn.process_id = success.process_id;
        conn.secret_key = success.secret_key;
        Ok(conn)
    }

    fn drive_startup(
        &mut self,
        provider: &dyn CryptoProvider,
        params: &StartupParams<'_>,
        mut fsm: StartupFsm,
        initial: Vec<u8>,
    ) -> Result<StartupSuccess> {
        self.transport.write_all(&initial)?;

        let mut bytes_read = 0;
        loop {
            let message = self.next_message(bytes_read)?;
            bytes_read = 0;

            match fsm.resume(provider, params, message)? {
                StartupAction::Send(buf) => self.transport.write_all(&buf)?,
                StartupAction::ReceiveMore => {}
                StartupAction::Notice(diag) => log_notice(&diag),
                StartupAction::ParameterStatus { name, value } => {
                    log::debug!(target: "pgwire_core::connection", "parameter {name} = {value}");
                }
                StartupAction::Done(success) => return Ok(success),
            }
        }
    }

    /// Runs `request` to completion, feeding every backend message into
    /// `handler`, and returns the handler so the caller can pull whatever
    /// it accumulated (e.g. [`crate::response::RowSink`]'s rows) back out.
    pub fn execute<H: ResponseHandler>(&mut self, request: &Request, handler: H) -> Result<H> {
        self.transport.write_all(&request.payload)?;

        let mut driver = ResponseDriver::new(request.sync_count, handler);
        let mut bytes_read = 0;
        loop {
            let message = self.next_message(bytes_read)?;
            bytes_read = 0;

            match driver.resume(message)? {
                ResponseAction::ReadMore => {}
                ResponseAction::Notice(diag) => log_notice(&diag),
                ResponseAction::ParameterStatus { name, value } => {
                    log::debug!(target: "pgwire_core::connection", "parameter {name} = {value}");
                }
                ResponseAction::Notification { process_id, channel, payload } => {
                    log::info!(
                        target: "pgwire_core::notification",
                        "notification on {channel:?} from pid {process_id}: {payload:?}"
                    );
                }
                ResponseAction::Done => return Ok(driver.into_handler()),
            }
        }
    }

    /// The `BackendKeyData` this connection was assigned at startup, for
    /// building a `CancelRequest` on a separate connection (§4.9, §4.1).
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    pub fn close(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        frontend::terminate(&mut buf)?;
        self.transport.write_all(&buf)?;
        Ok(())
    }

    fn next_message(&mut self, mut bytes_read: usize) -> Result<BackendMessage<'_>> {
        loop {
            match self.stream.resume(bytes_read)? {
                StreamAction::Read { hint } => {
                    let buf = self.stream.fill_buf(hint);
                    let n = self.transport.read(buf)?;
                    if n == 0 {
                        return Err(ConnectionError::Transport(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed by peer",
                        )));
                    }
                    bytes_read = n;
                }
                StreamAction::Message(message) => return Ok(message),
            }
        }
    }
}

/// Builds a `CancelRequest` payload for `process_id`/`secret_key`. Sent on
/// a brand-new connection (never an established one, per protocol) that is
/// closed immediately after writing it; this crate leaves opening that
/// throwaway connection to the caller.
pub fn cancel_request_payload(process_id: i32, secret_key: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    frontend::cancel_request(process_id, secret_key, &mut buf);
    buf
}

#[cfg(test)]
#[cfg(feature = "default-crypto")]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;
    use crate::response::DiscardingHandler;
    use std::collections::VecDeque;

    /// A `Transport` backed by a scripted queue of server replies. Writes
    /// are recorded but otherwise ignored; tests assert on them directly.
    struct ScriptedTransport {
        inbound: VecDeque<u8>,
        pub written: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<u8>) -> Self {
            ScriptedTransport { inbound: script.into(), written: Vec::new() }
        }
    }

    impl Transport for ScriptedTransport {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.written.extend_from_slice(buf);
            Ok(())
        }
    }

    fn push_message(script: &mut Vec<u8>, tag: u8, body: &[u8]) {
        script.push(tag);
        script.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        script.extend_from_slice(body);
    }

    fn authentication_ok() -> Vec<u8> {
        let mut script = Vec::new();
        push_message(&mut script, b'R', &0i32.to_be_bytes());
        let mut key_data = Vec::new();
        key_data.extend_from_slice(&10i32.to_be_bytes());
        key_data.extend_from_slice(&42i32.to_be_bytes());
        push_message(&mut script, b'K', &key_data);
        push_message(&mut script, b'Z', b"I");
        script
    }

    #[test]
    fn connect_drives_startup_to_completion() {
        let transport = ScriptedTransport::new(authentication_ok());
        let provider = DefaultCryptoProvider;
        let params = ConnectParams::new().user("alice").database("app");

        let conn = Connection::connect(transport, &provider, &params).unwrap();
        assert_eq!(conn.process_id(), 10);
        assert_eq!(conn.secret_key(), 42);
    }

    #[test]
    fn connect_writes_a_startup_message_first() {
        let transport = ScriptedTransport::new(authentication_ok());
        let provider = DefaultCryptoProvider;
        let params = ConnectParams::new().user("alice");

        let conn = Connection::connect(transport, &provider, &params).unwrap();
        // StartupMessage has no leading tag byte, just a length then the
        // protocol version (00 03 00 00).
        let written = &conn.transport.written;
        let len = i32::from_be_bytes(written[0..4].try_into().unwrap());
        assert_eq!(len as usize, written.len());
        assert_eq!(&written[4..8], &[0, 3, 0, 0]);
    }

    #[test]
    fn execute_runs_a_simple_query_to_done() {
        let mut script = authentication_ok();
        push_message(&mut script, b'C', b"SELECT 1\0");
        push_message(&mut script, b'Z', b"I");

        let transport = ScriptedTransport::new(script);
        let provider = DefaultCryptoProvider;
        let params = ConnectParams::new().user("alice");
        let mut conn = Connection::connect(transport, &provider, &params).unwrap();

        let mut request = Request::new();
        request.add_simple_query("select 1;").unwrap();
        let handler = conn.execute(&request, DiscardingHandler::default()).unwrap();
        assert!(handler.take_error().is_none());
    }

    #[test]
    fn cancel_request_payload_has_the_cancel_magic() {
        let payload = cancel_request_payload(10, 42);
        // length(16) + magic(80877102) + pid + secret
        assert_eq!(payload.len(), 16);
        assert_eq!(&payload[4..8], &80877102i32.to_be_bytes());
    }
}
