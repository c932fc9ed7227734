//! CryptoKit: RSA keys, the multi-hash digest family, symmetric keys,
//! PBKDF2, HashId content identifiers, KeyAddress identifiers, and the
//! Safe58 textual codec.
//!
//! ```rust,ignore
//! use u8core::crypto::{RsaPrivateKey, HashAlg};
//!
//! let private = RsaPrivateKey::generate(2048)?;
//! let sig = private.sign(b"hello", HashAlg::Sha512)?;
//! assert!(private.public_key().verify(b"hello", &sig, HashAlg::Sha512)?);
//! ```

mod hash;
mod hash_id;
mod key_address;
mod key_info;
mod pbkdf2_kdf;
mod rsa_key;
mod safe58;
mod signature;
mod symmetric;

pub use hash::{digest, HashAlg, StreamingHash};
pub use hash_id::HashId;
pub use key_address::KeyAddress;
pub use key_info::{KeyAlgorithm, KeyInfo, Prf};
pub use pbkdf2_kdf::pbkdf2_derive;
pub use rsa_key::{RsaPrivateKey, RsaPublicKey};
pub use safe58::Safe58;
pub use signature::ExtendedSignature;
pub use symmetric::SymmetricKey;

use thiserror::Error;

/// CryptoKit's unified error type.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("key encoding error: {0}")]
    Encoding(String),

    #[error("serializer error: {0}")]
    Serializer(#[from] crate::serializer::DecodingError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
