//! Crate-wide error aggregation.
//!
//! Each component (serializer, crypto, runtime, session, loader) defines its
//! own error enum close to the code that raises it; `CoreError` aggregates
//! them behind `#[from]` so the CLI boundary can match on one type.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::loader::ModuleError;
use crate::runtime::RuntimeError;
use crate::serializer::DecodingError;
use crate::session::SessionError;

/// Top-level error type returned by the CLI and any other external caller
/// that needs a single type to propagate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serializer error: {0}")]
    Decoding(#[from] DecodingError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("module error: {0}")]
    Module(#[from] ModuleError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
