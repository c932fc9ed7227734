//! SymmetricKey: a 32-byte key material block, from which an AES-256-CTR
//! cipher key and an HMAC-SHA-256 authentication key are derived, matching
//! the reference implementation's symmetric session-key format:
//! `IV (16 bytes) || ciphertext || tag (32 bytes)`.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{CryptoError, CryptoResult};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
const KEY_LEN: usize = 32;

const CIPHER_KEY_LABEL: &[u8] = b"u8core-symmetric-cipher-key";
const MAC_KEY_LABEL: &[u8] = b"u8core-symmetric-mac-key";

/// Single-block HMAC-based expansion (HKDF-Expand's first block) of
/// `master` into an independent 32-byte subkey tagged by `label`, so the
/// cipher key and MAC key never collide even though both derive from the
/// same master material.
fn derive_subkey(master: &[u8; KEY_LEN], label: &[u8]) -> [u8; KEY_LEN] {
    let mut mac = HmacSha256::new_from_slice(master).expect("HMAC accepts any key length");
    mac.update(label);
    mac.finalize().into_bytes().into()
}

/// A 32-byte key material block. The AES-CTR cipher key and the
/// HMAC-SHA-256 authentication key are both derived from it on
/// construction, never transmitted or stored separately, so the wire
/// format stays a single 32-byte blob. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SymmetricKey {
    master: [u8; KEY_LEN],
    cipher_key: [u8; KEY_LEN],
    mac_key: [u8; KEY_LEN],
}

impl SymmetricKey {
    fn from_master(master: [u8; KEY_LEN]) -> Self {
        let cipher_key = derive_subkey(&master, CIPHER_KEY_LABEL);
        let mac_key = derive_subkey(&master, MAC_KEY_LABEL);
        Self { master, cipher_key, mac_key }
    }

    /// Generate a fresh random 32-byte key material block.
    pub fn generate() -> Self {
        let mut master = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut master);
        Self::from_master(master)
    }

    /// Build a key from exactly 32 bytes of key material, deriving the
    /// cipher and MAC keys from it.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidArgument(format!(
                "SymmetricKey requires {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut master = [0u8; KEY_LEN];
        master.copy_from_slice(bytes);
        Ok(Self::from_master(master))
    }

    /// The 32-byte key material block, suitable for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.master.to_vec()
    }

    /// Encrypt `plaintext`, returning `iv || ciphertext || tag`. The tag
    /// covers the IV and the ciphertext (encrypt-then-MAC).
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let mut buf = plaintext.to_vec();
        let mut cipher = Aes256Ctr::new((&self.cipher_key).into(), (&iv).into());
        cipher.apply_keystream(&mut buf);

        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("HMAC accepts any key length");
        mac.update(&iv);
        mac.update(&buf);
        let tag = mac.finalize().into_bytes();

        let mut out = Vec::with_capacity(IV_LEN + buf.len() + TAG_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);
        out.extend_from_slice(&tag);
        out
    }

    /// Verify the tag, then decrypt. Fails closed with
    /// `CryptoError::AuthenticationFailed` on any tag mismatch, before any
    /// plaintext is produced.
    pub fn decrypt(&self, packed: &[u8]) -> CryptoResult<Vec<u8>> {
        if packed.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::Decryption("ciphertext too short".into()));
        }
        let (iv, rest) = packed.split_at(IV_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("HMAC accepts any key length");
        mac.update(iv);
        mac.update(ciphertext);
        mac.verify_slice(tag)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        let mut buf = ciphertext.to_vec();
        let mut cipher = Aes256Ctr::new(self.cipher_key.as_slice().into(), iv.into());
        cipher.apply_keystream(&mut buf);
        Ok(buf)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey").finish_non_exhaustive()
    }
}
