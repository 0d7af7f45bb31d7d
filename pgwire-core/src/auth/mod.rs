//! C5: startup/auth FSM. Sends `StartupMessage`, drives whichever
//! authentication sub-protocol the server asks for, then consumes messages
//! until `ReadyForQuery`.
//!
//! Grounded on `nativepg/protocol/startup_fsm.hpp` for the overall
//! resume-point shape (`startup_params` in, a tagged `result` out) and on
//! `sqlx-core/src/postgres/connection/establish.rs::establish` for the
//! concrete "loop on backend message kind" control flow this crate adapts
//! from an `async fn` into an explicit suspend/resume state machine.

pub mod scram;

use crate::crypto::{self, CryptoProvider};
use crate::error::{Diagnostics, Error, Result};
use crate::message::backend::{Authentication, BackendMessage};
use crate::message::frontend;

/// `{user, password, optional database}`, the input to the startup FSM.
/// A thin subset of [`crate::params::ConnectParams`] — only the fields C5
/// itself needs.
#[derive(Debug, Clone)]
pub struct StartupParams<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub database: Option<&'a str>,
    pub application_name: Option<&'a str>,
    /// Whether `AuthenticationCleartextPassword` may be answered at all.
    /// Defaults to `false` via [`StartupParams::new`]: cleartext auth puts
    /// the password on the wire unencrypted, so a caller has to opt in
    /// rather than fall into it silently.
    pub allow_cleartext_password: bool,
    /// Whether `AuthenticationMD5Password` may be answered at all. Defaults
    /// to `false` via [`StartupParams::new`]: MD5 auth is a known-weak hash
    /// a server may still request, so a caller has to opt in the same way as
    /// cleartext rather than fall into it silently.
    pub allow_md5_password: bool,
}

impl<'a> StartupParams<'a> {
    pub fn new(user: &'a str, password: &'a str) -> Self {
        StartupParams {
            user,
            password,
            database: None,
            application_name: None,
            allow_cleartext_password: false,
            allow_md5_password: false,
        }
    }
}

/// Successful outcome of the startup FSM: the `BackendKeyData` needed later
/// to issue a `CancelRequest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartupSuccess {
    pub process_id: i32,
    pub secret_key: i32,
}

/// Result of a single [`StartupFsm::resume`] call.
pub enum StartupAction {
    /// Write these bytes to the transport, then read one message and call
    /// `resume` again.
    Send(Vec<u8>),
    /// Read one message and call `resume` again; nothing to write this time.
    ReceiveMore,
    /// A `NoticeResponse` was absorbed; forward it to a log/side channel (per
    /// §10) and then read one more message before calling `resume` again.
    Notice(Diagnostics),
    /// A `ParameterStatus` was absorbed; record it and then read one more
    /// message before calling `resume` again.
    ParameterStatus { name: String, value: String },
    /// Authentication succeeded and the connection is ready for queries.
    Done(StartupSuccess),
}

#[derive(Debug)]
enum ScramState {
    AwaitServerFirst { bare: String, client_nonce: String },
    AwaitServerFinal { expected_server_signature: [u8; 32] },
}

#[derive(Debug)]
enum State {
    AwaitAuth,
    InScram(ScramState),
    AwaitReady(StartupSuccess),
    Done,
}

/// The startup/auth state machine (C5). Owns no transport; the caller reads
/// and writes bytes on its behalf.
pub struct StartupFsm {
    state: State,
}

impl Default for StartupFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupFsm {
    pub fn new() -> Self {
        StartupFsm { state: State::AwaitAuth }
    }

    /// Builds the initial `StartupMessage`. Call once, before reading any
    /// backend messages.
    pub fn begin(&mut self, params: &StartupParams<'_>) -> Result<Vec<u8>> {
        log::debug!("starting postgres connection handshake for user {:?}", params.user);

        let mut kv = Vec::new();
        if let Some(database) = params.database {
            kv.push(("database", database));
        }
        if let Some(application_name) = params.application_name {
            kv.push(("application_name", application_name));
        }

        let mut buf = Vec::new();
        frontend::startup_message(params.user, &kv, &mut buf)?;
        Ok(buf)
    }

    /// Advances the FSM with one backend message. Never call again after a
    /// `Done` or an `Err`; both are terminal.
    pub fn resume(
        &mut self,
        provider: &dyn CryptoProvider,
        params: &StartupParams<'_>,
        message: BackendMessage<'_>,
    ) -> Result<StartupAction> {
        if let BackendMessage::NoticeResponse(fields) = message {
            return Ok(StartupAction::Notice(fields.into()));
        }
        if let BackendMessage::ParameterStatus(status) = message {
            return Ok(StartupAction::ParameterStatus {
                name: status.name.to_owned(),
                value: status.value.to_owned(),
            });
        }

        match std::mem::replace(&mut self.state, State::Done) {
            State::AwaitAuth => self.resume_auth(provider, params, message),
            State::InScram(scram_state) => self.resume_scram(provider, params, scram_state, message),
            State::AwaitReady(success) => self.resume_ready(success, message),
            State::Done => Err(Error::UnexpectedMessage(
                "startup FSM resumed after completion".into(),
            )),
        }
    }

    fn resume_auth(
        &mut self,
        provider: &dyn CryptoProvider,
        params: &StartupParams<'_>,
        message: BackendMessage<'_>,
    ) -> Result<StartupAction> {
        let auth = match message {
            BackendMessage::Authentication(auth) => auth,
            BackendMessage::ErrorResponse(fields) => {
                return Err(Error::AuthFailed(Some(fields.into())))
            }
            other => return Err(Error::UnexpectedMessage(other.tag().to_string())),
        };

        match auth {
            Authentication::Ok => {
                self.state = State::AwaitReady(StartupSuccess::default());
                Ok(StartupAction::ReceiveMore)
            }
            Authentication::CleartextPassword => {
                if !params.allow_cleartext_password {
                    return Err(Error::AuthCleartextPasswordUnsupported);
                }
                let mut buf = Vec::new();
                frontend::password_message(params.password, &mut buf)?;
                self.state = State::AwaitAuth;
                Ok(StartupAction::Send(buf))
            }
            Authentication::Md5Password { salt } => {
                if !params.allow_md5_password {
                    return Err(Error::AuthMd5PasswordUnsupported);
                }
                let hash = crypto::md5_password_hash(provider, params.user, params.password, salt);
                let mut buf = Vec::new();
                frontend::password_message(&hash, &mut buf)?;
                self.state = State::AwaitAuth;
                Ok(StartupAction::Send(buf))
            }
            Authentication::Sasl(data) => {
                let supports_scram = Authentication::sasl_mechanisms(data).any(|m| m == "SCRAM-SHA-256");
                if !supports_scram {
                    return Err(Error::AuthSaslUnsupported);
                }

                let first = scram::client_first_message(provider, params.user);
                let mut buf = Vec::new();
                frontend::sasl_initial_response("SCRAM-SHA-256", first.message.as_bytes(), &mut buf)?;
                self.state = State::InScram(ScramState::AwaitServerFirst {
                    bare: first.bare,
                    client_nonce: first.client_nonce,
                });
                Ok(StartupAction::Send(buf))
            }
            Authentication::KerberosV5 => Err(Error::AuthKerberosV5Unsupported),
            Authentication::Gss | Authentication::GssContinue(_) => Err(Error::AuthGssUnsupported),
            Authentication::Sspi => Err(Error::AuthSspiUnsupported),
            Authentication::SaslContinue(_) | Authentication::SaslFinal(_) => Err(
                Error::UnexpectedMessage("SASL continuation received outside an exchange".into()),
            ),
        }
    }

    fn resume_scram(
        &mut self,
        provider: &dyn CryptoProvider,
        params: &StartupParams<'_>,
        scram_state: ScramState,
        message: BackendMessage<'_>,
    ) -> Result<StartupAction> {
        if let BackendMessage::ErrorResponse(fields) = message {
            return Err(Error::AuthFailed(Some(fields.into())));
        }

        match scram_state {
            ScramState::AwaitServerFirst { bare, client_nonce } => {
                let data = match message {
                    BackendMessage::Authentication(Authentication::SaslContinue(data)) => data,
                    other => return Err(Error::UnexpectedMessage(other.tag().to_string())),
                };

                let server_first = scram::parse_server_first(provider, data, &client_nonce)?;
                let client_final =
                    scram::client_final_message(provider, params.password, &bare, &server_first);

                let mut buf = Vec::new();
                frontend::sasl_response(client_final.message.as_bytes(), &mut buf)?;
                self.state = State::InScram(ScramState::AwaitServerFinal {
                    expected_server_signature: client_final.expected_server_signature,
                });
                Ok(StartupAction::Send(buf))
            }
            ScramState::AwaitServerFinal { expected_server_signature } => {
                let data = match message {
                    BackendMessage::Authentication(Authentication::SaslFinal(data)) => data,
                    other => return Err(Error::UnexpectedMessage(other.tag().to_string())),
                };

                scram::verify_server_final(provider, data, &expected_server_signature)?;
                self.state = State::AwaitAuth;
                Ok(StartupAction::ReceiveMore)
            }
        }
    }

    fn resume_ready(
        &mut self,
        mut success: StartupSuccess,
        message: BackendMessage<'_>,
    ) -> Result<StartupAction> {
        match message {
            BackendMessage::BackendKeyData(key_data) => {
                success.process_id = key_data.process_id;
                success.secret_key = key_data.secret_key;
                self.state = State::AwaitReady(success);
                Ok(StartupAction::ReceiveMore)
            }
            BackendMessage::ErrorResponse(fields) => Err(Error::AuthFailed(Some(fields.into()))),
            BackendMessage::ReadyForQuery(_) => {
                log::info!("postgres connection authenticated");
                Ok(StartupAction::Done(success))
            }
            other => Err(Error::UnexpectedMessage(other.tag().to_string())),
        }
    }
}

#[cfg(test)]
#[cfg(feature = "default-crypto")]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;
    use crate::message::backend::{BackendKeyData, ReadyForQuery, TransactionStatus};

    fn params<'a>() -> StartupParams<'a> {
        StartupParams {
            user: "postgres",
            password: "hunter2",
            database: Some("postgres"),
            application_name: None,
            allow_cleartext_password: true,
            allow_md5_password: true,
        }
    }

    #[test]
    fn cleartext_password_then_ok_then_ready() {
        let provider = DefaultCryptoProvider;
        let p = params();
        let mut fsm = StartupFsm::new();
        fsm.begin(&p).unwrap();

        match fsm
            .resume(&provider, &p, BackendMessage::Authentication(Authentication::CleartextPassword))
            .unwrap()
        {
            StartupAction::Send(buf) => assert_eq!(buf[0], b'p'),
            _ => panic!("expected Send"),
        }

        match fsm
            .resume(&provider, &p, BackendMessage::Authentication(Authentication::Ok))
            .unwrap()
        {
            StartupAction::ReceiveMore => {}
            _ => panic!("expected ReceiveMore"),
        }

        match fsm
            .resume(
                &provider,
                &p,
                BackendMessage::BackendKeyData(BackendKeyData { process_id: 10, secret_key: 42 }),
            )
            .unwrap()
        {
            StartupAction::ReceiveMore => {}
            _ => panic!("expected ReceiveMore"),
        }

        match fsm
            .resume(
                &provider,
                &p,
                BackendMessage::ReadyForQuery(ReadyForQuery { status: TransactionStatus::Idle }),
            )
            .unwrap()
        {
            StartupAction::Done(success) => {
                assert_eq!(success.process_id, 10);
                assert_eq!(success.secret_key, 42);
            }
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn sasl_without_scram_sha_256_is_rejected() {
        let provider = DefaultCryptoProvider;
        let p = params();
        let mut fsm = StartupFsm::new();
        fsm.begin(&p).unwrap();

        let mechanisms = b"SCRAM-SHA-1\0\0";
        let err = fsm
            .resume(&provider, &p, BackendMessage::Authentication(Authentication::Sasl(mechanisms)))
            .unwrap_err();
        assert!(matches!(err, Error::AuthSaslUnsupported));
    }

    #[test]
    fn cleartext_password_is_rejected_unless_opted_in() {
        let provider = DefaultCryptoProvider;
        let mut p = params();
        p.allow_cleartext_password = false;
        let mut fsm = StartupFsm::new();
        fsm.begin(&p).unwrap();

        let err = fsm
            .resume(&provider, &p, BackendMessage::Authentication(Authentication::CleartextPassword))
            .unwrap_err();
        assert!(matches!(err, Error::AuthCleartextPasswordUnsupported));
    }

    #[test]
    fn md5_password_is_rejected_unless_opted_in() {
        let provider = DefaultCryptoProvider;
        let mut p = params();
        p.allow_md5_password = false;
        let mut fsm = StartupFsm::new();
        fsm.begin(&p).unwrap();

        let err = fsm
            .resume(
                &provider,
                &p,
                BackendMessage::Authentication(Authentication::Md5Password { salt: [1, 2, 3, 4] }),
            )
            .unwrap_err();
        assert!(matches!(err, Error::AuthMd5PasswordUnsupported));
    }

    #[test]
    fn md5_password_is_answered_when_opted_in() {
        let provider = DefaultCryptoProvider;
        let p = params();
        let mut fsm = StartupFsm::new();
        fsm.begin(&p).unwrap();

        match fsm
            .resume(
                &provider,
                &p,
                BackendMessage::Authentication(Authentication::Md5Password { salt: [1, 2, 3, 4] }),
            )
            .unwrap()
        {
            StartupAction::Send(buf) => assert_eq!(buf[0], b'p'),
            _ => panic!("expected Send"),
        }
    }

    #[test]
    fn error_response_during_auth_is_auth_failed() {
        let provider = DefaultCryptoProvider;
        let p = params();
        let mut fsm = StartupFsm::new();
        fsm.begin(&p).unwrap();

        let fields = crate::message::backend::NoticeFields {
            severity: Some("FATAL"),
            message: Some("password authentication failed"),
            ..Default::default()
        };
        let err = fsm
            .resume(&provider, &p, BackendMessage::ErrorResponse(fields))
            .unwrap_err();
        assert!(matches!(err, Error::AuthFailed(Some(_))));
    }

    #[test]
    fn notice_during_ready_wait_is_surfaced_without_advancing_state() {
        let provider = DefaultCryptoProvider;
        let p = params();
        let mut fsm = StartupFsm::new();
        fsm.begin(&p).unwrap();
        fsm.resume(&provider, &p, BackendMessage::Authentication(Authentication::Ok)).unwrap();

        let fields = crate::message::backend::NoticeFields {
            severity: Some("NOTICE"),
            message: Some("hello"),
            ..Default::default()
        };
        match fsm.resume(&provider, &p, BackendMessage::NoticeResponse(fields)).unwrap() {
            StartupAction::Notice(d) => assert_eq!(d.message.as_deref(), Some("hello")),
            _ => panic!("expected Notice"),
        }
    }
}
