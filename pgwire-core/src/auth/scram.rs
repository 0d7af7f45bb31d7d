//! §4.5.1: SCRAM-SHA-256 (RFC 7677) message construction and verification.
//!
//! Grounded on `sqlx-core/src/postgres/protocol/sasl.rs` for the GS2 header,
//! attribute names, and the `Hi()` key-stretch shape, and on
//! `nativepg/protocol/scram_sha256.hpp` for the three-message split
//! (`scram_sha256_client_first_message` / `_server_first_message` /
//! `_client_final_message`) this module mirrors as
//! [`ClientFirst`]/[`ServerFirst`]/[`ClientFinal`].

use crate::crypto::CryptoProvider;
use crate::error::{Error, Result};

const GS2_HEADER: &str = "n,,";
/// `base64("n,,")`, the channel-binding flag sent back in the client-final
/// message (no channel binding is negotiated).
const CBIND_INPUT_B64: &str = "biws";
const NONCE_LEN: usize = 18;

/// Escapes `=` and `,` per RFC 4013's `saslname` production, required
/// whenever a username appears inside a SCRAM message.
fn escape_saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

/// The client-first-message, kept alongside the "bare" portion (without the
/// GS2 header) needed later to build the SCRAM `AuthMessage`.
pub struct ClientFirst {
    /// Full message, to send as the SASL initial response.
    pub message: String,
    /// `n=<user>,r=<nonce>`, without the `n,,` GS2 header.
    pub bare: String,
    pub client_nonce: String,
}

pub fn client_first_message(provider: &dyn CryptoProvider, user: &str) -> ClientFirst {
    let client_nonce = provider.base64_encode(&provider.random_nonce(NONCE_LEN));
    let bare = format!("n={},r={}", escape_saslname(user), client_nonce);
    let message = format!("{GS2_HEADER}{bare}");
    ClientFirst { message, bare, client_nonce }
}

/// The server-first-message, parsed into its three fields plus the raw text
/// (needed verbatim for the `AuthMessage`).
pub struct ServerFirst {
    pub raw: String,
    pub nonce: String,
    pub salt: Vec<u8>,
    pub iterations: u32,
}

pub fn parse_server_first(
    provider: &dyn CryptoProvider,
    data: &[u8],
    client_nonce: &str,
) -> Result<ServerFirst> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::InvalidScramMessage("server-first-message is not utf-8".into()))?;

    let mut nonce = None;
    let mut salt = None;
    let mut iterations = None;

    for attr in text.split(',') {
        let (key, value) = attr
            .split_once('=')
            .ok_or_else(|| Error::InvalidScramMessage(format!("malformed attribute: {attr:?}")))?;
        match key {
            "r" => nonce = Some(value),
            "s" => salt = Some(value),
            "i" => iterations = Some(value),
            "m" => return Err(Error::MandatoryScramExtensionNotSupported),
            _ => {}
        }
    }

    let nonce = nonce
        .ok_or_else(|| Error::InvalidScramMessage("missing nonce (r=) in server-first-message".into()))?;
    if !nonce.starts_with(client_nonce) {
        return Err(Error::InvalidScramMessage(
            "server nonce does not extend the client nonce".into(),
        ));
    }

    let salt_b64 = salt
        .ok_or_else(|| Error::InvalidScramMessage("missing salt (s=) in server-first-message".into()))?;
    let salt = provider.base64_decode(salt_b64)?;

    let iterations: u32 = iterations
        .ok_or_else(|| Error::InvalidScramMessage("missing iteration count (i=) in server-first-message".into()))?
        .parse()
        .map_err(|_| Error::InvalidScramMessage("non-numeric iteration count".into()))?;

    Ok(ServerFirst {
        raw: text.to_owned(),
        nonce: nonce.to_owned(),
        salt,
        iterations,
    })
}

/// The client-final-message plus the `ServerSignature` the client expects
/// back, so the caller can verify the server-final-message without
/// recomputing key material.
pub struct ClientFinal {
    pub message: String,
    pub expected_server_signature: [u8; 32],
}

/// Builds the client-final-message and the expected server signature from
/// the password, the client-first "bare" portion, and the server-first
/// message, per RFC 7677 §3.
pub fn client_final_message(
    provider: &dyn CryptoProvider,
    password: &str,
    client_first_bare: &str,
    server_first: &ServerFirst,
) -> ClientFinal {
    let password = normalize_password(password);

    let salted_password =
        provider.pbkdf2_hmac_sha256(password.as_bytes(), &server_first.salt, server_first.iterations);
    let client_key = provider.hmac_sha256(&salted_password, b"Client Key");
    let stored_key = provider.sha256(&client_key);
    let server_key = provider.hmac_sha256(&salted_password, b"Server Key");

    let client_final_without_proof = format!("c={CBIND_INPUT_B64},r={}", server_first.nonce);
    let auth_message =
        format!("{client_first_bare},{},{client_final_without_proof}", server_first.raw);

    let client_signature = provider.hmac_sha256(&stored_key, auth_message.as_bytes());
    let mut client_proof = client_key;
    for (p, s) in client_proof.iter_mut().zip(client_signature.iter()) {
        *p ^= s;
    }

    let expected_server_signature = provider.hmac_sha256(&server_key, auth_message.as_bytes());

    let message = format!(
        "{client_final_without_proof},p={}",
        provider.base64_encode(&client_proof)
    );

    ClientFinal { message, expected_server_signature }
}

/// Parses the server-final-message (`v=<base64 signature>`) and checks it
/// against what [`client_final_message`] expected.
pub fn verify_server_final(
    provider: &dyn CryptoProvider,
    data: &[u8],
    expected_server_signature: &[u8; 32],
) -> Result<()> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::InvalidScramMessage("server-final-message is not utf-8".into()))?;

    let signature_b64 = text
        .strip_prefix("v=")
        .ok_or_else(|| Error::InvalidScramMessage(format!("malformed server-final-message: {text:?}")))?;
    let signature = provider.base64_decode(signature_b64)?;

    if signature == expected_server_signature {
        Ok(())
    } else {
        Err(Error::AuthFailed(None))
    }
}

#[cfg(feature = "default-crypto")]
fn normalize_password(password: &str) -> std::borrow::Cow<'_, str> {
    std::borrow::Cow::Owned(crate::crypto::saslprep(password))
}

#[cfg(not(feature = "default-crypto"))]
fn normalize_password(password: &str) -> std::borrow::Cow<'_, str> {
    std::borrow::Cow::Borrowed(password)
}
