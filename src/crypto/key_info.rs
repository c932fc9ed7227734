//! KeyInfo: a validating description of a derived or stored key — its
//! algorithm, PRF (if derived via PBKDF2), salt, iteration count, and target
//! key length — mirroring the reference implementation's key-info record
//! used to reconstruct a `SymmetricKey` from a passphrase.

use super::{CryptoError, CryptoResult};

const DEFAULT_SALT: &[u8] = b"attesta";
const MIN_ITERATIONS: u32 = 100;

/// The kind of key a `KeyInfo` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    RsaPrivate,
    RsaPublic,
    Aes256,
}

/// The PBKDF2 pseudo-random function, when a key is derived from a
/// passphrase rather than stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prf {
    None,
    HmacSha1,
    HmacSha256,
    HmacSha512,
}

/// A validated key description. Constructed only through [`KeyInfo::new`],
/// which enforces the cross-field invariants documented on each field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    algorithm: KeyAlgorithm,
    prf: Prf,
    salt: Vec<u8>,
    rounds: u32,
    key_length: usize,
}

impl KeyInfo {
    /// Construct a `KeyInfo`, enforcing:
    /// - RSA algorithms never carry a PRF (they are not PBKDF2-derived).
    /// - `Aes256` keys are always exactly 32 bytes.
    /// - a non-`None` PRF requires `rounds >= 100` and `key_length >= 16`.
    pub fn new(
        algorithm: KeyAlgorithm,
        prf: Prf,
        salt: Vec<u8>,
        rounds: u32,
        key_length: usize,
    ) -> CryptoResult<Self> {
        match algorithm {
            KeyAlgorithm::RsaPrivate | KeyAlgorithm::RsaPublic if prf != Prf::None => {
                return Err(CryptoError::InvalidArgument(
                    "RSA keys cannot carry a PBKDF2 PRF".into(),
                ));
            }
            KeyAlgorithm::Aes256 if key_length != 32 => {
                return Err(CryptoError::InvalidArgument(
                    "AES-256 keys must be exactly 32 bytes".into(),
                ));
            }
            _ => {}
        }
        if prf != Prf::None {
            if rounds < MIN_ITERATIONS {
                return Err(CryptoError::InvalidArgument(format!(
                    "PBKDF2 iteration count must be >= {MIN_ITERATIONS}, got {rounds}"
                )));
            }
            if key_length < 16 {
                return Err(CryptoError::InvalidArgument(
                    "derived key length must be >= 16 bytes".into(),
                ));
            }
        }
        Ok(Self {
            algorithm,
            prf,
            salt,
            rounds,
            key_length,
        })
    }

    /// A `KeyInfo` for a directly-stored (non-derived) key of `algorithm`.
    pub fn stored(algorithm: KeyAlgorithm, key_length: usize) -> CryptoResult<Self> {
        Self::new(algorithm, Prf::None, DEFAULT_SALT.to_vec(), 0, key_length)
    }

    /// A `KeyInfo` for an `Aes256` key derived via PBKDF2 with the library's
    /// default salt.
    pub fn derived(prf: Prf, rounds: u32) -> CryptoResult<Self> {
        Self::new(KeyAlgorithm::Aes256, prf, DEFAULT_SALT.to_vec(), rounds, 32)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn prf(&self) -> Prf {
        self.prf
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_keys_reject_a_prf() {
        assert!(KeyInfo::new(KeyAlgorithm::RsaPrivate, Prf::HmacSha256, vec![], 1000, 256).is_err());
    }

    #[test]
    fn aes256_requires_32_byte_length() {
        assert!(KeyInfo::new(KeyAlgorithm::Aes256, Prf::None, vec![], 0, 16).is_err());
        assert!(KeyInfo::new(KeyAlgorithm::Aes256, Prf::None, vec![], 0, 32).is_ok());
    }

    #[test]
    fn derived_keys_enforce_minimum_rounds_and_length() {
        assert!(KeyInfo::new(
            KeyAlgorithm::Aes256,
            Prf::HmacSha256,
            DEFAULT_SALT.to_vec(),
            50,
            32
        )
        .is_err());
        assert!(KeyInfo::new(
            KeyAlgorithm::Aes256,
            Prf::HmacSha256,
            DEFAULT_SALT.to_vec(),
            1000,
            8
        )
        .is_err());
    }

    #[test]
    fn default_salt_constructor_round_trips_fields() {
        let info = KeyInfo::derived(Prf::HmacSha256, 10_000).unwrap();
        assert_eq!(info.salt(), DEFAULT_SALT);
        assert_eq!(info.rounds(), 10_000);
        assert_eq!(info.key_length(), 32);
        assert_eq!(info.prf(), Prf::HmacSha256);
    }

    #[test]
    fn stored_rsa_key_info_has_no_prf() {
        let info = KeyInfo::stored(KeyAlgorithm::RsaPublic, 270).unwrap();
        assert_eq!(info.prf(), Prf::None);
        assert_eq!(info.algorithm(), KeyAlgorithm::RsaPublic);
    }
}
