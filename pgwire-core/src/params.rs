//! §11: connection configuration — a plain options struct plus a
//! `KEY=VALUE;` connection-string parser, independent of how the bytes
//! it describes eventually reach a socket (that's [`crate::connection`]'s
//! job).
//!
//! Grounded on `nativepg/misc/params.hpp` (`parse_string_to_pairs`,
//! `expand_environment_variables`, `find_value_case_insensitive`) for the
//! parsing and environment-expansion semantics, and on
//! `sqlx-core/src/postgres/options.rs` (`PgConnectOptions`) for the
//! builder-style options struct shape this crate's connection entry point
//! takes instead of a bare connection string.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Parameters needed to establish and authenticate a connection (§4.9,
/// §4.5). Unlike `PgConnectOptions` in the teacher, there is no TLS/SSL
/// mode here: transport security is the caller's [`crate::connection::Transport`]
/// implementation's concern, not this crate's (non-goal, §1).
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    pub application_name: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Whether `AuthenticationCleartextPassword` may be answered at all.
    /// `false` by default: a server asking for a cleartext password wants it
    /// sent unencrypted, so a caller has to opt in rather than fall into it
    /// silently.
    pub allow_cleartext_password: bool,
    /// Whether `AuthenticationMD5Password` may be answered at all. `false`
    /// by default, for the same reason as [`ConnectParams::allow_cleartext_password`]:
    /// MD5 is a known-weak hash a caller should opt into rather than accept
    /// silently.
    pub allow_md5_password: bool,
}

impl Default for ConnectParams {
    fn default() -> Self {
        ConnectParams {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: None,
            database: None,
            application_name: None,
            connect_timeout: None,
            allow_cleartext_password: false,
            allow_md5_password: false,
        }
    }
}

impl ConnectParams {
    pub fn new() -> Self {
        ConnectParams::default()
    }

    /// Parses a `KEY=VALUE;KEY=VALUE;...` connection string. Keys are
    /// matched case-insensitively; unknown keys are ignored (the original
    /// does the same via `find_value_case_insensitive` returning an empty
    /// string for anything it doesn't look up). Values go through
    /// [`expand_environment_variables`] before being stored.
    ///
    /// Recognized keys: `host`, `port`, `user`, `password`, `database` (or
    /// `dbname`), `application_name`, `connect_timeout` (seconds).
    pub fn parse(connection_string: &str) -> Result<Self> {
        let pairs = parse_string_to_pairs(connection_string);
        let mut params = ConnectParams::default();

        if let Some(host) = find_value_case_insensitive(&pairs, "host") {
            params.host = host;
        }
        if let Some(port) = find_value_case_insensitive(&pairs, "port") {
            params.port = port
                .parse()
                .map_err(|_| Error::ProtocolValueError(format!("invalid port: {port:?}")))?;
        }
        if let Some(user) = find_value_case_insensitive(&pairs, "user") {
            params.user = user;
        }
        if let Some(password) = find_value_case_insensitive(&pairs, "password") {
            params.password = Some(password);
        }
        if let Some(database) = find_value_case_insensitive(&pairs, "database")
            .or_else(|| find_value_case_insensitive(&pairs, "dbname"))
        {
            params.database = Some(database);
        }
        if let Some(name) = find_value_case_insensitive(&pairs, "application_name") {
            params.application_name = Some(name);
        }
        if let Some(secs) = find_value_case_insensitive(&pairs, "connect_timeout") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::ProtocolValueError(format!("invalid connect_timeout: {secs:?}")))?;
            params.connect_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(flag) = find_value_case_insensitive(&pairs, "allow_cleartext_password") {
            params.allow_cleartext_password = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Some(flag) = find_value_case_insensitive(&pairs, "allow_md5_password") {
            params.allow_md5_password = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        Ok(params)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn allow_cleartext_password(mut self, allow: bool) -> Self {
        self.allow_cleartext_password = allow;
        self
    }

    pub fn allow_md5_password(mut self, allow: bool) -> Self {
        self.allow_md5_password = allow;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

type NameValuePair = (String, String);

/// Splits `input` on `;`, then each chunk on the first `=` into a
/// name/value pair (a bare token with no `=` becomes `(token, "")`), and
/// expands environment variable references in every value.
fn parse_string_to_pairs(input: &str) -> Vec<NameValuePair> {
    input
        .split(';')
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let (name, value) = match chunk.find('=') {
                Some(pos) => (&chunk[..pos], &chunk[pos + 1..]),
                None => (chunk, ""),
            };
            (name.to_string(), expand_environment_variables(value))
        })
        .collect()
}

fn find_value_case_insensitive(pairs: &[NameValuePair], search_name: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(search_name))
        .map(|(_, value)| value.clone())
}

/// Expands `${VAR}`, `$VAR` and `%VAR%` references against the process
/// environment. A reference to an unset variable is left as-is.
fn expand_environment_variables(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' {
            if input[i + 1..].starts_with('{') {
                if let Some(end) = input[i + 2..].find('}') {
                    let name = &input[i + 2..i + 2 + end];
                    if is_var_name(name) {
                        push_var(&mut out, name, &input[i..i + 3 + end]);
                        i += 3 + end;
                        continue;
                    }
                }
            } else {
                let rest = &input[i + 1..];
                let end = rest.find(|c: char| !c.is_ascii_alphanumeric() && c != '_').unwrap_or(rest.len());
                if end > 0 {
                    let name = &rest[..end];
                    push_var(&mut out, name, &input[i..i + 1 + end]);
                    i += 1 + end;
                    continue;
                }
            }
        } else if bytes[i] == b'%' {
            if let Some(end) = input[i + 1..].find('%') {
                let name = &input[i + 1..i + 1 + end];
                if !name.is_empty() && is_var_name(name) {
                    push_var(&mut out, name, &input[i..i + 2 + end]);
                    i += 2 + end;
                    continue;
                }
            }
        }

        // Not a recognized reference: copy one whole character (not just one
        // byte) so multi-byte UTF-8 in the value survives untouched.
        let ch = input[i..].chars().next().expect("i < bytes.len()");
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn push_var(out: &mut String, name: &str, whole_match: &str) {
    match env::var(name) {
        Ok(value) => out.push_str(&value),
        Err(_) => out.push_str(whole_match),
    }
}
