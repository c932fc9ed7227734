//! ExtendedSignature: a Boss-encoded signature record binding a signer's
//! `KeyAddress`, a creation timestamp, and one or more digests of the
//! signed payload under different hash algorithms.
//!
//! Verification is strict: every digest field present in the record must
//! verify against the supplied public key, and at least one digest field
//! must be present. A record with zero digest fields, or with any digest
//! field that fails to verify, is rejected outright — there is no
//! "best effort" or majority-vote fallback.

use crate::serializer::{decode, encode, Value};

use super::hash::HashAlg;
use super::key_address::KeyAddress;
use super::rsa_key::{RsaPrivateKey, RsaPublicKey};
use super::{CryptoError, CryptoResult};

/// A signature over one or more hash algorithms of the same payload.
#[derive(Debug, Clone)]
pub struct ExtendedSignature {
    signer_address: KeyAddress,
    created_at: i64,
    sha512: Option<Vec<u8>>,
    sha3_256: Option<Vec<u8>>,
    sha3_384: Option<Vec<u8>>,
    signature: Vec<u8>,
}

impl ExtendedSignature {
    /// Sign `data` with `key`, at minimum under SHA-512; `extra` selects any
    /// additional SHA3 digests to bind into the same record.
    pub fn sign(
        key: &RsaPrivateKey,
        data: &[u8],
        extra: &[HashAlg],
    ) -> CryptoResult<Self> {
        let created_at = 0; // caller stamps a real clock value via `with_timestamp`
        let sha512 = Some(super::hash::digest(HashAlg::Sha512, data));
        let sha3_256 = extra
            .contains(&HashAlg::Sha3_256)
            .then(|| super::hash::digest(HashAlg::Sha3_256, data));
        let sha3_384 = extra
            .contains(&HashAlg::Sha3_384)
            .then(|| super::hash::digest(HashAlg::Sha3_384, data));

        let body = Self::record_body(&sha512, &sha3_256, &sha3_384, created_at);
        let signature = key.sign(&body, HashAlg::Sha512)?;

        Ok(Self {
            signer_address: key.public_key().long_address().clone(),
            created_at,
            sha512,
            sha3_256,
            sha3_384,
            signature,
        })
    }

    /// Set the record's creation timestamp (Unix seconds) and re-sign it.
    pub fn with_timestamp(mut self, key: &RsaPrivateKey, created_at: i64) -> CryptoResult<Self> {
        self.created_at = created_at;
        let body = Self::record_body(&self.sha512, &self.sha3_256, &self.sha3_384, created_at);
        self.signature = key.sign(&body, HashAlg::Sha512)?;
        Ok(self)
    }

    fn record_body(
        sha512: &Option<Vec<u8>>,
        sha3_256: &Option<Vec<u8>>,
        sha3_384: &Option<Vec<u8>>,
        created_at: i64,
    ) -> Vec<u8> {
        let mut fields = vec![("created_at".to_string(), Value::Time(created_at as u64))];
        if let Some(d) = sha512 {
            fields.push(("sha512".to_string(), Value::Bytes(d.clone())));
        }
        if let Some(d) = sha3_256 {
            fields.push(("sha3_256".to_string(), Value::Bytes(d.clone())));
        }
        if let Some(d) = sha3_384 {
            fields.push(("sha3_384".to_string(), Value::Bytes(d.clone())));
        }
        encode(&Value::Mapping(fields))
    }

    /// Verify every digest field present against `data` and `key`, and the
    /// outer RSA signature against `key`. Succeeds only if at least one
    /// digest field is present and every present field matches.
    pub fn verify(&self, key: &RsaPublicKey, data: &[u8]) -> CryptoResult<bool> {
        if self.sha512.is_none() && self.sha3_256.is_none() && self.sha3_384.is_none() {
            return Err(CryptoError::InvalidArgument(
                "signature record carries no digest fields".into(),
            ));
        }
        let body = Self::record_body(&self.sha512, &self.sha3_256, &self.sha3_384, self.created_at);
        if !key.verify(&body, &self.signature, HashAlg::Sha512)? {
            return Ok(false);
        }
        if let Some(expected) = &self.sha512 {
            if *expected != super::hash::digest(HashAlg::Sha512, data) {
                return Ok(false);
            }
        }
        if let Some(expected) = &self.sha3_256 {
            if *expected != super::hash::digest(HashAlg::Sha3_256, data) {
                return Ok(false);
            }
        }
        if let Some(expected) = &self.sha3_384 {
            if *expected != super::hash::digest(HashAlg::Sha3_384, data) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn signer_address(&self) -> &KeyAddress {
        &self.signer_address
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Serialize the whole record (digests, signature, signer address) as a
    /// self-contained Boss-encoded byte string, for embedding in a module
    /// bundle trailer.
    pub fn pack(&self) -> Vec<u8> {
        let mut fields = vec![
            ("signer".to_string(), Value::Bytes(self.signer_address.as_bytes().to_vec())),
            ("created_at".to_string(), Value::Time(self.created_at as u64)),
            ("signature".to_string(), Value::Bytes(self.signature.clone())),
        ];
        if let Some(d) = &self.sha512 {
            fields.push(("sha512".to_string(), Value::Bytes(d.clone())));
        }
        if let Some(d) = &self.sha3_256 {
            fields.push(("sha3_256".to_string(), Value::Bytes(d.clone())));
        }
        if let Some(d) = &self.sha3_384 {
            fields.push(("sha3_384".to_string(), Value::Bytes(d.clone())));
        }
        encode(&Value::Mapping(fields))
    }

    pub fn unpack(bytes: &[u8]) -> CryptoResult<Self> {
        let value = decode(bytes)?;
        let get_bytes = |key: &str| -> Option<Vec<u8>> { value.get(key).and_then(|v| v.as_bytes()) };
        let signer = get_bytes("signer").ok_or_else(|| CryptoError::Encoding("missing signer".into()))?;
        let created_at = value
            .get("created_at")
            .and_then(|v| v.as_time())
            .ok_or_else(|| CryptoError::Encoding("missing created_at".into()))?;
        let signature =
            get_bytes("signature").ok_or_else(|| CryptoError::Encoding("missing signature".into()))?;
        Ok(Self {
            signer_address: KeyAddress::from_bytes(signer)?,
            created_at: created_at as i64,
            sha512: get_bytes("sha512"),
            sha3_256: get_bytes("sha3_256"),
            sha3_384: get_bytes("sha3_384"),
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let data = b"module bundle payload";
        let sig = ExtendedSignature::sign(&key, data, &[HashAlg::Sha3_256])
            .unwrap()
            .with_timestamp(&key, 1_700_000_000)
            .unwrap();
        assert!(sig.verify(&key.public_key(), data).unwrap());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let sig = ExtendedSignature::sign(&key, b"original", &[]).unwrap();
        assert!(!sig.verify(&key.public_key(), b"tampered").unwrap());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key_a = RsaPrivateKey::generate(2048).unwrap();
        let key_b = RsaPrivateKey::generate(2048).unwrap();
        let sig = ExtendedSignature::sign(&key_a, b"payload", &[]).unwrap();
        assert!(!sig.verify(&key_b.public_key(), b"payload").unwrap());
    }

    #[test]
    fn pack_unpack_round_trip() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let sig = ExtendedSignature::sign(&key, b"payload", &[HashAlg::Sha3_256, HashAlg::Sha3_384])
            .unwrap();
        let packed = sig.pack();
        let restored = ExtendedSignature::unpack(&packed).unwrap();
        assert!(restored.verify(&key.public_key(), b"payload").unwrap());
        assert_eq!(restored.signer_address(), sig.signer_address());
    }

    #[test]
    fn rejects_a_record_with_no_digest_fields() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let sig = ExtendedSignature {
            signer_address: key.public_key().long_address().clone(),
            created_at: 0,
            sha512: None,
            sha3_256: None,
            sha3_384: None,
            signature: vec![0; 4],
        };
        assert!(sig.verify(&key.public_key(), b"payload").is_err());
    }
}
