//! HashId: a 96-byte composite content identifier, the concatenation of
//! SHA-512/256, SHA3-256, and Streebog-256 digests of the same data, in that
//! order. Used throughout the reference protocol to name immutable blobs
//! (module bundles, contract payloads) without committing to a single hash
//! algorithm.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::hash::{sha512_256, streebog_256};
use super::hash::{digest, HashAlg};
use super::{CryptoError, CryptoResult};

const COMPONENT_LEN: usize = 32;
const TOTAL_LEN: usize = COMPONENT_LEN * 3;

/// A composite, order-sensitive content identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashId([u8; TOTAL_LEN]);

impl HashId {
    /// Compute the `HashId` of `data`.
    pub fn of(data: &[u8]) -> Self {
        let mut bytes = [0u8; TOTAL_LEN];
        bytes[0..32].copy_from_slice(&sha512_256(data));
        bytes[32..64].copy_from_slice(&digest(HashAlg::Sha3_256, data));
        bytes[64..96].copy_from_slice(&streebog_256(data));
        Self(bytes)
    }

    /// Rebuild a `HashId` from its three component digests, computed
    /// elsewhere (e.g. streamed over a large blob).
    pub fn with_digests(sha512_256: [u8; 32], sha3_256: [u8; 32], streebog_256: [u8; 32]) -> Self {
        let mut bytes = [0u8; TOTAL_LEN];
        bytes[0..32].copy_from_slice(&sha512_256);
        bytes[32..64].copy_from_slice(&sha3_256);
        bytes[64..96].copy_from_slice(&streebog_256);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != TOTAL_LEN {
            return Err(CryptoError::Encoding(format!(
                "HashId must be {TOTAL_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; TOTAL_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn sha512_256(&self) -> &[u8] {
        &self.0[0..32]
    }

    pub fn sha3_256(&self) -> &[u8] {
        &self.0[32..64]
    }

    pub fn streebog_256(&self) -> &[u8] {
        &self.0[64..96]
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Display for HashId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}
