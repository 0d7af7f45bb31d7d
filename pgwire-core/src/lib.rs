#![forbid(unsafe_code)]

//! A sans-I/O PostgreSQL wire-protocol v3.0 client engine.
//!
//! Every state machine in this crate (`framing`, `stream`, `auth`,
//! `response`) only transforms bytes and never owns a socket, a thread or a
//! timer: [`connection::Connection`] is the one piece that reads and writes
//! actual bytes, and it does so through the caller-supplied
//! [`connection::Transport`] rather than an async runtime (no runtime
//! dependency is carried, per the teacher's `sqlx-rt` split — this crate
//! generalizes that split away entirely instead of picking one runtime).

pub mod auth;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod framing;
pub mod io;
pub mod message;
pub mod params;
pub mod request;
pub mod response;
pub mod row;
pub mod stream;
pub mod types;

pub use connection::{cancel_request_payload, Connection, ConnectionError, Transport};
pub use crypto::CryptoProvider;
#[cfg(feature = "default-crypto")]
pub use crypto::DefaultCryptoProvider;
pub use error::{Diagnostics, Error, Result};
pub use message::backend::BackendMessage;
pub use params::ConnectParams;
pub use request::{ParamRef, Request};
pub use response::{Composite, DiscardingHandler, ResponseAction, ResponseDriver, ResponseHandler, RowSink};
pub use row::{FieldSource, FromRow};

#[cfg(feature = "derive")]
pub use pgwire_derive::FromRow;
