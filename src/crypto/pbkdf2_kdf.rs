//! PBKDF2 key derivation, driving the `pbkdf2` crate with the PRF chosen by
//! a `KeyInfo`.

use hmac::Hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use super::key_info::Prf;
use super::{CryptoError, CryptoResult};

const MIN_ITERATIONS: u32 = 100;

/// Derive `key_length` bytes from `passphrase` and `salt` using `prf`,
/// iterating `rounds` times. Rejects `prf == Prf::None` and iteration
/// counts below the minimum the reference implementation enforces.
pub fn pbkdf2_derive(
    prf: Prf,
    passphrase: &[u8],
    salt: &[u8],
    rounds: u32,
    key_length: usize,
) -> CryptoResult<Vec<u8>> {
    if rounds < MIN_ITERATIONS {
        return Err(CryptoError::InvalidArgument(format!(
            "PBKDF2 iteration count must be >= {MIN_ITERATIONS}, got {rounds}"
        )));
    }
    let mut out = vec![0u8; key_length];
    match prf {
        Prf::None => {
            return Err(CryptoError::InvalidArgument(
                "PBKDF2 requires a PRF other than None".into(),
            ))
        }
        Prf::HmacSha1 => pbkdf2::pbkdf2::<Hmac<Sha1>>(passphrase, salt, rounds, &mut out)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?,
        Prf::HmacSha256 => pbkdf2::pbkdf2::<Hmac<Sha256>>(passphrase, salt, rounds, &mut out)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?,
        Prf::HmacSha512 => pbkdf2::pbkdf2::<Hmac<Sha512>>(passphrase, salt, rounds, &mut out)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?,
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = pbkdf2_derive(Prf::HmacSha256, b"pass", b"attesta", 1000, 32).unwrap();
        let b = pbkdf2_derive(Prf::HmacSha256, b"pass", b"attesta", 1000, 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_prfs_yield_different_keys() {
        let a = pbkdf2_derive(Prf::HmacSha1, b"pass", b"attesta", 1000, 32).unwrap();
        let b = pbkdf2_derive(Prf::HmacSha256, b"pass", b"attesta", 1000, 32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_low_iteration_counts() {
        assert!(pbkdf2_derive(Prf::HmacSha256, b"pass", b"attesta", 10, 32).is_err());
    }

    #[test]
    fn rejects_prf_none() {
        assert!(pbkdf2_derive(Prf::None, b"pass", b"attesta", 1000, 32).is_err());
    }

    #[test]
    fn honors_requested_output_length() {
        let out = pbkdf2_derive(Prf::HmacSha512, b"pass", b"attesta", 1000, 48).unwrap();
        assert_eq!(out.len(), 48);
    }
}
