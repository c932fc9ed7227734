//! SecureSession: a three-leg nonce handshake over HTTP
//! `multipart/form-data`, yielding a symmetric session key used for
//! subsequent encrypted command RPC.
//!
//! ```rust,ignore
//! use u8core::session::SessionClient;
//!
//! let client = SessionClient::new("http://localhost:8080", my_private_key, server_public_key);
//! client.handshake().await?;
//! let reply = client.command("hello", Value::Mapping(vec![])).await?;
//! ```

mod handshake;
mod rpc;
mod server;
mod state;

pub use handshake::SessionClient;
pub use server::{CommandHandler, SecureSessionServer};
pub use state::{SessionState, SessionStore};

use thiserror::Error;

/// SecureSession's unified error type.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("nonce mismatch")]
    BadNonce,

    #[error("signature verification failed")]
    BadSignature,

    #[error("unknown session id: {0}")]
    UnknownSession(u64),

    #[error("session key mismatch")]
    KeyMismatch,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("serializer error: {0}")]
    Serializer(#[from] crate::serializer::DecodingError),

    #[error("server returned an error: {0}")]
    Remote(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
