//! KeyAddress: a compact, self-checking identifier derived from an RSA
//! public key's size class and a SHA3 digest of its components.
//!
//! Layout: one prefix byte `(key_mask << 4) | type_mark`, followed by a
//! SHA3-256 digest (short form) or SHA3-384 digest (long form) of the key's
//! exponent and modulus, followed by a 4-byte CRC32 of everything before it.
//! `key_mask` is `1` for 2048-bit keys and `2` for 4096-bit keys (with
//! exponent fixed at 65537); any other bit length/exponent combination is
//! rejected rather than silently masked. The whole byte string is rendered
//! as a Safe58 string for display and exchange.

use super::rsa_key::RsaPublicKey;
use super::{CryptoError, CryptoResult};
use super::hash::{digest, HashAlg};
use super::safe58::Safe58;

const TYPE_MARK: u8 = 0;
const PUBLIC_EXPONENT: u64 = 65537;

fn key_mask(pk: &RsaPublicKey) -> CryptoResult<u8> {
    let exponent_ok = pk.exponent() == PUBLIC_EXPONENT.to_be_bytes().to_vec()
        || pk.exponent() == {
            let mut v = PUBLIC_EXPONENT.to_be_bytes().to_vec();
            while v.first() == Some(&0) {
                v.remove(0);
            }
            v
        };
    if !exponent_ok {
        return Err(CryptoError::InvalidArgument(
            "KeyAddress requires the public exponent to be 65537".into(),
        ));
    }
    match pk.modulus_bits() {
        2048 => Ok(1),
        4096 => Ok(2),
        other => Err(CryptoError::InvalidArgument(format!(
            "KeyAddress supports only 2048- or 4096-bit keys, got {other}"
        ))),
    }
}

/// A derived key identifier, either the 37-byte short form (SHA3-256) or the
/// 53-byte long form (SHA3-384).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyAddress {
    bytes: Vec<u8>,
}

impl KeyAddress {
    /// Derive the address for `pk`; `long` selects SHA3-384 over SHA3-256.
    pub fn derive(pk: &RsaPublicKey, long: bool) -> Self {
        // `RsaPublicKey::short_address`/`long_address` only ever call this
        // with keys that already passed generation/unpack validation, so a
        // mismatched exponent/bit-length here would be a programmer error.
        let mask = key_mask(pk).expect("KeyAddress::derive requires a 2048/4096-bit, e=65537 key");
        let prefix = (mask << 4) | TYPE_MARK;

        let mut components = pk.exponent();
        components.extend_from_slice(&pk.modulus());
        let alg = if long { HashAlg::Sha3_384 } else { HashAlg::Sha3_256 };
        let body_digest = digest(alg, &components);

        let mut bytes = Vec::with_capacity(1 + body_digest.len() + 4);
        bytes.push(prefix);
        bytes.extend_from_slice(&body_digest);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());

        Self { bytes }
    }

    /// Parse a previously-derived address from its raw byte form, validating
    /// the trailing CRC32.
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != 37 && bytes.len() != 53 {
            return Err(CryptoError::Encoding(format!(
                "KeyAddress must be 37 or 53 bytes, got {}",
                bytes.len()
            )));
        }
        let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
        let expected = crc32fast::hash(body);
        let actual = u32::from_be_bytes(crc_bytes.try_into().unwrap());
        if expected != actual {
            return Err(CryptoError::Encoding("KeyAddress checksum mismatch".into()));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether this is the long (SHA3-384, 53-byte) form.
    pub fn is_long(&self) -> bool {
        self.bytes.len() == 53
    }

    /// Whether `pk` is the key this address was derived from.
    pub fn matches(&self, pk: &RsaPublicKey) -> bool {
        &Self::derive(pk, self.is_long()) == self
    }

    pub fn to_safe58(&self) -> String {
        Safe58::encode(&self.bytes)
    }

    pub fn parse(s: &str) -> CryptoResult<Self> {
        Self::from_bytes(Safe58::decode(s)?)
    }
}

impl std::fmt::Display for KeyAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_safe58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::rsa_key::RsaPrivateKey;

    #[test]
    fn derives_distinct_short_and_long_forms() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let pk = key.public_key();
        let short = KeyAddress::derive(&pk, false);
        let long = KeyAddress::derive(&pk, true);
        assert_eq!(short.as_bytes().len(), 37);
        assert_eq!(long.as_bytes().len(), 53);
        assert!(!short.is_long());
        assert!(long.is_long());
        assert_ne!(short.as_bytes(), long.as_bytes());
    }

    #[test]
    fn matches_only_the_originating_key() {
        let key_a = RsaPrivateKey::generate(2048).unwrap();
        let key_b = RsaPrivateKey::generate(2048).unwrap();
        let addr = KeyAddress::derive(&key_a.public_key(), false);
        assert!(addr.matches(&key_a.public_key()));
        assert!(!addr.matches(&key_b.public_key()));
    }

    #[test]
    fn safe58_round_trip() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let addr = KeyAddress::derive(&key.public_key(), false);
        let text = addr.to_safe58();
        let parsed = KeyAddress::parse(&text).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn rejects_unsupported_key_sizes() {
        let key = RsaPrivateKey::generate(3072).unwrap();
        let pk = key.public_key();
        assert!(key_mask(&pk).is_err());
    }

    #[test]
    fn from_bytes_rejects_corrupted_checksum() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let addr = KeyAddress::derive(&key.public_key(), false);
        let mut bytes = addr.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(KeyAddress::from_bytes(bytes).is_err());
    }
}
