//! RSA keys: generation, RSAES-OAEP encryption (SHA-1 label/MGF hash), and
//! RSASSA-PSS signatures (MGF1-SHA-1 regardless of the data-hash choice,
//! maximum allowed salt length).

use once_cell::sync::OnceCell;
use rsa::pss::Pss;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, RsaPrivateKey as RsaPriv, RsaPublicKey as RsaPub};
use sha1::Sha1;
use zeroize::ZeroizeOnDrop;

use super::hash::{digest, HashAlg};
use super::key_address::KeyAddress;
use super::{CryptoError, CryptoResult};

const PUBLIC_EXPONENT: u64 = 65537;
const SHA1_LEN: usize = 20;

fn max_salt_len(modulus_bits: usize) -> usize {
    let k = modulus_bits.div_ceil(8);
    k.saturating_sub(SHA1_LEN + 2)
}

/// An RSA public key, with its `KeyAddress` forms computed lazily and cached
/// (mirroring the reference implementation's `getShortAddress`/
/// `getLongAddress` lazy caching).
pub struct RsaPublicKey {
    inner: RsaPub,
    short_address: OnceCell<KeyAddress>,
    long_address: OnceCell<KeyAddress>,
}

impl RsaPublicKey {
    fn from_inner(inner: RsaPub) -> Self {
        Self {
            inner,
            short_address: OnceCell::new(),
            long_address: OnceCell::new(),
        }
    }

    pub fn modulus_bits(&self) -> usize {
        self.inner.size() * 8
    }

    pub fn exponent(&self) -> Vec<u8> {
        self.inner.e().to_bytes_be()
    }

    pub fn modulus(&self) -> Vec<u8> {
        self.inner.n().to_bytes_be()
    }

    /// Serialize as a `[kind=1, e, N]` array, as a Boss `Value`.
    pub fn pack(&self) -> crate::serializer::Value {
        use crate::serializer::Value;
        Value::Array(vec![
            Value::Int(1),
            Value::Bytes(self.exponent()),
            Value::Bytes(self.modulus()),
        ])
    }

    pub fn unpack(value: &crate::serializer::Value) -> CryptoResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| CryptoError::Encoding("expected array".into()))?;
        if items.len() != 3 {
            return Err(CryptoError::Encoding("expected 3-element RSA public key array".into()));
        }
        let kind = items[0]
            .as_i64()
            .ok_or_else(|| CryptoError::Encoding("expected kind int".into()))?;
        if kind != 1 {
            return Err(CryptoError::Encoding(format!("unexpected key kind {kind}")));
        }
        let e = items[1].as_bytes().ok_or_else(|| CryptoError::Encoding("expected e bytes".into()))?;
        let n = items[2].as_bytes().ok_or_else(|| CryptoError::Encoding("expected N bytes".into()))?;
        let inner = RsaPub::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Ok(Self::from_inner(inner))
    }

    /// RSAES-OAEP encryption with SHA-1 as both the label hash and the MGF
    /// hash.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;
        let padding = Oaep::new::<Sha1>();
        self.inner
            .encrypt(&mut rng, padding, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Verify an RSASSA-PSS signature over `data`, hashed first with `alg`.
    /// MGF1-SHA-1 is used regardless of `alg`, with the maximum salt length
    /// permitted by the modulus size.
    pub fn verify(&self, data: &[u8], signature: &[u8], alg: HashAlg) -> CryptoResult<bool> {
        let hashed = digest(alg, data);
        let salt_len = max_salt_len(self.modulus_bits());
        let padding = Pss::new_with_salt::<Sha1>(salt_len);
        Ok(self.inner.verify(padding, &hashed, signature).is_ok())
    }

    /// The 37-byte "short" KeyAddress (SHA3-256-based), computed once and
    /// cached.
    pub fn short_address(&self) -> &KeyAddress {
        self.short_address
            .get_or_init(|| KeyAddress::derive(self, false))
    }

    /// The 53-byte "long" KeyAddress (SHA3-384-based), computed once and
    /// cached.
    pub fn long_address(&self) -> &KeyAddress {
        self.long_address
            .get_or_init(|| KeyAddress::derive(self, true))
    }
}

impl Clone for RsaPublicKey {
    fn clone(&self) -> Self {
        Self::from_inner(self.inner.clone())
    }
}

impl std::fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("bits", &self.modulus_bits())
            .finish()
    }
}

impl PartialEq for RsaPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner.n() == other.inner.n() && self.inner.e() == other.inner.e()
    }
}

/// An RSA private key. Zeroized on drop; the public key is cheap to derive
/// and is not itself sensitive.
#[derive(ZeroizeOnDrop)]
pub struct RsaPrivateKey {
    #[zeroize(skip)]
    inner: RsaPriv,
}

impl RsaPrivateKey {
    /// Generate a key of the requested bit strength (≥ 2048 mandated),
    /// public exponent fixed at 65537.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        if bits < 2048 {
            return Err(CryptoError::InvalidArgument(format!(
                "RSA key size must be >= 2048 bits, got {bits}"
            )));
        }
        let mut rng = rand::rngs::OsRng;
        let inner = RsaPriv::new(&mut rng, bits).map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        debug_assert_eq!(inner.e(), &BigUint::from(PUBLIC_EXPONENT));
        Ok(Self { inner })
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from_inner(self.inner.to_public_key())
    }

    /// Serialize as a `[kind=0, e, p, q]` array.
    pub fn pack(&self) -> crate::serializer::Value {
        use crate::serializer::Value;
        let primes = self.inner.primes();
        Value::Array(vec![
            Value::Int(0),
            Value::Bytes(self.inner.e().to_bytes_be()),
            Value::Bytes(primes[0].to_bytes_be()),
            Value::Bytes(primes[1].to_bytes_be()),
        ])
    }

    /// Reconstruct a private key from a `[kind=0, e, p, q]` array.
    pub fn unpack(value: &crate::serializer::Value) -> CryptoResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| CryptoError::Encoding("expected array".into()))?;
        if items.len() != 4 {
            return Err(CryptoError::Encoding("expected 4-element RSA private key array".into()));
        }
        let kind = items[0]
            .as_i64()
            .ok_or_else(|| CryptoError::Encoding("expected kind int".into()))?;
        if kind != 0 {
            return Err(CryptoError::Encoding(format!("unexpected key kind {kind}")));
        }
        let e = items[1].as_bytes().ok_or_else(|| CryptoError::Encoding("expected e bytes".into()))?;
        let p = items[2].as_bytes().ok_or_else(|| CryptoError::Encoding("expected p bytes".into()))?;
        let q = items[3].as_bytes().ok_or_else(|| CryptoError::Encoding("expected q bytes".into()))?;
        let inner = RsaPriv::from_p_q(
            BigUint::from_bytes_be(p),
            BigUint::from_bytes_be(q),
            BigUint::from_bytes_be(e),
        )
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Ok(Self { inner })
    }

    /// RSAES-OAEP decryption, mirroring `RsaPublicKey::encrypt`.
    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let padding = Oaep::new::<Sha1>();
        self.inner
            .decrypt(padding, ciphertext)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }

    /// RSASSA-PSS signing: `data` is first hashed with `alg`; the PSS
    /// padding's MGF is fixed at MGF1-SHA-1 with the maximum salt length
    /// allowed by the modulus size, independent of `alg`.
    pub fn sign(&self, data: &[u8], alg: HashAlg) -> CryptoResult<Vec<u8>> {
        let hashed = digest(alg, data);
        let bits = self.inner.size() * 8;
        let salt_len = max_salt_len(bits);
        let mut rng = rand::rngs::OsRng;
        let padding = Pss::new_with_salt::<Sha1>(salt_len);
        self.inner
            .sign_with_rng(&mut rng, padding, &hashed)
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::generate(2048).unwrap()
    }

    #[test]
    fn rejects_weak_key_sizes() {
        assert!(RsaPrivateKey::generate(1024).is_err());
    }

    #[test]
    fn oaep_round_trip() {
        let key = test_key();
        let pk = key.public_key();
        let msg = b"a session key blob, 32 bytes ok";
        let ct = pk.encrypt(msg).unwrap();
        let pt = key.decrypt(&ct).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn pss_sign_and_verify_round_trip() {
        let key = test_key();
        let pk = key.public_key();
        let msg = b"welcome to the Universa";
        for alg in [HashAlg::Sha256, HashAlg::Sha512, HashAlg::Sha3_256] {
            let sig = key.sign(msg, alg).unwrap();
            assert!(pk.verify(msg, &sig, alg).unwrap());
        }
    }

    #[test]
    fn verification_fails_for_wrong_hash_choice() {
        let key = test_key();
        let pk = key.public_key();
        let msg = b"data";
        let sig = key.sign(msg, HashAlg::Sha256).unwrap();
        assert!(!pk.verify(msg, &sig, HashAlg::Sha512).unwrap());
    }

    #[test]
    fn pack_unpack_round_trip() {
        let key = test_key();
        let pk = key.public_key();
        let packed = pk.pack();
        let restored = RsaPublicKey::unpack(&packed).unwrap();
        assert_eq!(pk, restored);
    }

    #[test]
    fn addresses_are_cached_and_stable() {
        let key = test_key();
        let pk = key.public_key();
        let a1 = pk.short_address().clone();
        let a2 = pk.short_address().clone();
        assert_eq!(a1, a2);
        assert!(pk.long_address().is_long());
        assert!(!pk.short_address().is_long());
    }
}
