//! The multi-hash digest family: SHA-1, SHA-256, SHA-512, SHA3-256,
//! SHA3-384, SHA3-512, plus the GOST 34.11-2012 ("Streebog") 256-bit digest
//! consumed only by `HashId`.

use sha1::Sha1;
use sha2::{Sha256, Sha512};
use sha3::{Sha3_256, Sha3_384, Sha3_512};
use streebog::Streebog256;

use digest::Digest;

/// The hash algorithms exposed by CryptoKit's one-shot `digest` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha512,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl HashAlg {
    /// The digest's documented output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
            HashAlg::Sha512 => 64,
            HashAlg::Sha3_256 => 32,
            HashAlg::Sha3_384 => 48,
            HashAlg::Sha3_512 => 64,
        }
    }
}

/// Compute a one-shot digest of `data` under algorithm `alg`.
pub fn digest(alg: HashAlg, data: &[u8]) -> Vec<u8> {
    match alg {
        HashAlg::Sha1 => Sha1::digest(data).to_vec(),
        HashAlg::Sha256 => Sha256::digest(data).to_vec(),
        HashAlg::Sha512 => Sha512::digest(data).to_vec(),
        HashAlg::Sha3_256 => Sha3_256::digest(data).to_vec(),
        HashAlg::Sha3_384 => Sha3_384::digest(data).to_vec(),
        HashAlg::Sha3_512 => Sha3_512::digest(data).to_vec(),
    }
}

/// SHA-512/256: SHA-512's compression function with the truncated IV from
/// FIPS 180-4, producing a 32-byte digest. Used only by `HashId`.
pub fn sha512_256(data: &[u8]) -> [u8; 32] {
    use sha2::Sha512_256;
    let out = Sha512_256::digest(data);
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

/// GOST 34.11-2012 ("Streebog"), 256-bit variant.
pub fn streebog_256(data: &[u8]) -> [u8; 32] {
    let out = Streebog256::digest(data);
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

/// A streaming digest: `update` any number of times, then `finalize` once.
pub enum StreamingHash {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Sha3_256(Sha3_256),
    Sha3_384(Sha3_384),
    Sha3_512(Sha3_512),
}

impl StreamingHash {
    pub fn new(alg: HashAlg) -> Self {
        match alg {
            HashAlg::Sha1 => StreamingHash::Sha1(Sha1::new()),
            HashAlg::Sha256 => StreamingHash::Sha256(Sha256::new()),
            HashAlg::Sha512 => StreamingHash::Sha512(Sha512::new()),
            HashAlg::Sha3_256 => StreamingHash::Sha3_256(Sha3_256::new()),
            HashAlg::Sha3_384 => StreamingHash::Sha3_384(Sha3_384::new()),
            HashAlg::Sha3_512 => StreamingHash::Sha3_512(Sha3_512::new()),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            StreamingHash::Sha1(h) => h.update(chunk),
            StreamingHash::Sha256(h) => h.update(chunk),
            StreamingHash::Sha512(h) => h.update(chunk),
            StreamingHash::Sha3_256(h) => h.update(chunk),
            StreamingHash::Sha3_384(h) => h.update(chunk),
            StreamingHash::Sha3_512(h) => h.update(chunk),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            StreamingHash::Sha1(h) => h.finalize().to_vec(),
            StreamingHash::Sha256(h) => h.finalize().to_vec(),
            StreamingHash::Sha512(h) => h.finalize().to_vec(),
            StreamingHash::Sha3_256(h) => h.finalize().to_vec(),
            StreamingHash::Sha3_384(h) => h.finalize().to_vec(),
            StreamingHash::Sha3_512(h) => h.finalize().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_lengths_match_documented_sizes() {
        for alg in [
            HashAlg::Sha1,
            HashAlg::Sha256,
            HashAlg::Sha512,
            HashAlg::Sha3_256,
            HashAlg::Sha3_384,
            HashAlg::Sha3_512,
        ] {
            let out = digest(alg, b"the quick brown fox");
            assert_eq!(out.len(), alg.output_len());
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let a = digest(HashAlg::Sha3_256, b"universa");
        let b = digest(HashAlg::Sha3_256, b"universa");
        assert_eq!(a, b);
    }

    #[test]
    fn sha1_matches_reference_vector() {
        // SHA-1("abc")
        let out = digest(HashAlg::Sha1, b"abc");
        assert_eq!(
            hex_encode(&out),
            "a9993e364706816aba3e25717850c26c9cd0d89"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut streaming = StreamingHash::new(HashAlg::Sha256);
        streaming.update(b"hello, ");
        streaming.update(b"world");
        let streamed = streaming.finalize();
        let oneshot = digest(HashAlg::Sha256, b"hello, world");
        assert_eq!(streamed, oneshot);
    }

    #[test]
    fn streebog_and_sha512_256_have_expected_lengths() {
        assert_eq!(streebog_256(b"x").len(), 32);
        assert_eq!(sha512_256(b"x").len(), 32);
    }

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
