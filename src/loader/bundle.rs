//! Module bundles: a zip archive carrying `manifest.yaml` plus script
//! sources, with a signature trailer appended after the zip's own
//! end-of-central-directory record.
//!
//! The trailer is `u16_le(L) ‖ serializer-encoded{pub_key, sha3_512}`. Since
//! the zip itself is written with an empty comment, its end-of-central-
//! directory record is self-terminating (`comment_length == 0`); the
//! trailer bytes simply follow it. Locating the boundary again on load
//! means scanning for that EOCD record rather than trusting the file's
//! raw tail, exactly as real unzip tools tolerate trailing data appended
//! after a complete archive.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::crypto::{HashAlg, RsaPrivateKey, RsaPublicKey};
use crate::serializer::{decode, encode, Value};

use super::{ModuleError, ModuleResult};

const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const EOCD_FIXED_LEN: usize = 22;

/// A signature trailer: the signer's public key and a SHA3-512/RSA-PSS
/// signature over everything preceding it.
pub struct SignatureTrailer {
    pub pub_key: RsaPublicKey,
    pub sha3_512: Vec<u8>,
}

impl SignatureTrailer {
    fn encode(&self) -> Vec<u8> {
        encode(&Value::Mapping(vec![
            ("pub_key".to_string(), self.pub_key.pack()),
            ("sha3_512".to_string(), Value::Bytes(self.sha3_512.clone())),
        ]))
    }

    fn decode(bytes: &[u8]) -> ModuleResult<Self> {
        let value = decode(bytes).map_err(|e| ModuleError::BadSignature(e.to_string()))?;
        let pub_key_value = value
            .get("pub_key")
            .ok_or_else(|| ModuleError::BadSignature("trailer missing pub_key".into()))?;
        let pub_key = RsaPublicKey::unpack(pub_key_value)
            .map_err(|e| ModuleError::BadSignature(e.to_string()))?;
        let sha3_512 = value
            .get("sha3_512")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| ModuleError::BadSignature("trailer missing sha3_512".into()))?
            .to_vec();
        Ok(Self { pub_key, sha3_512 })
    }
}

/// A loaded (or about-to-be-signed) bundle: the zip's raw body bytes, its
/// manifest, and its trailer once verified.
pub struct Bundle {
    body: Vec<u8>,
    pub trailer: SignatureTrailer,
}

impl Bundle {
    /// Locate the end of a comment-less zip's end-of-central-directory
    /// record, scanning from the end of `raw` for the EOCD signature with
    /// a zero declared comment length. Returns the byte offset one past
    /// the fixed 22-byte EOCD record.
    fn locate_body_end(raw: &[u8]) -> Option<usize> {
        if raw.len() < EOCD_FIXED_LEN {
            return None;
        }
        let last_start = raw.len() - EOCD_FIXED_LEN;
        for start in (0..=last_start).rev() {
            if raw[start..start + 4] == EOCD_SIGNATURE {
                let comment_len = u16::from_le_bytes([raw[start + 20], raw[start + 21]]);
                if comment_len == 0 {
                    return Some(start + EOCD_FIXED_LEN);
                }
            }
        }
        None
    }

    /// Split a raw bundle file into its zip body and signature trailer.
    pub fn parse(raw: &[u8]) -> ModuleResult<Self> {
        let body_end = Self::locate_body_end(raw)
            .ok_or_else(|| ModuleError::BadSignature("no end-of-central-directory found".into()))?;
        let rest = &raw[body_end..];
        if rest.len() < 2 {
            return Err(ModuleError::BadSignature("truncated signature trailer".into()));
        }
        let l = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let blob = rest
            .get(2..2 + l)
            .ok_or_else(|| ModuleError::BadSignature("truncated signature trailer".into()))?;
        let trailer = SignatureTrailer::decode(blob)?;
        Ok(Self {
            body: raw[..body_end].to_vec(),
            trailer,
        })
    }

    pub fn open(path: &Path) -> ModuleResult<Self> {
        let raw = std::fs::read(path).map_err(|e| ModuleError::NotFound(e.to_string()))?;
        Self::parse(&raw)
    }

    /// Embed a bundle compiled into the binary via `include_bytes!`.
    pub fn from_embedded(raw: &'static [u8]) -> ModuleResult<Self> {
        Self::parse(raw)
    }

    /// Verify the trailer's SHA3-512/RSA-PSS signature over the zip body.
    pub fn verify_signature(&self) -> ModuleResult<bool> {
        self.trailer
            .pub_key
            .verify(&self.body, &self.trailer.sha3_512, HashAlg::Sha3_512)
            .map_err(|e| ModuleError::BadSignature(e.to_string()))
    }

    /// Read one entry's contents from the zip body.
    pub fn read_entry(&self, name: &str) -> ModuleResult<Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(&self.body))
            .map_err(|e| ModuleError::ManifestMissing(e.to_string()))?;
        let mut entry = archive
            .by_name(name)
            .map_err(|_| ModuleError::ManifestMissing(name.to_string()))?;
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| ModuleError::ManifestMissing(e.to_string()))?;
        Ok(buf)
    }

    pub fn entry_names(&self) -> ModuleResult<Vec<String>> {
        let archive = ZipArchive::new(Cursor::new(&self.body))
            .map_err(|e| ModuleError::ManifestMissing(e.to_string()))?;
        Ok(archive.file_names().map(str::to_string).collect())
    }

    /// Sign a zip archive in place: build the trailer from `key` and
    /// append it after `zip_body`'s end-of-central-directory record.
    pub fn sign(zip_body: Vec<u8>, key: &RsaPrivateKey) -> ModuleResult<Vec<u8>> {
        if Self::locate_body_end(&zip_body) != Some(zip_body.len()) {
            return Err(ModuleError::BadSignature(
                "input is not a comment-less zip file".into(),
            ));
        }
        let signature = key
            .sign(&zip_body, HashAlg::Sha3_512)
            .map_err(|e| ModuleError::BadSignature(e.to_string()))?;
        let trailer = SignatureTrailer {
            pub_key: key.public_key(),
            sha3_512: signature,
        };
        let blob = trailer.encode();
        let l = u16::try_from(blob.len())
            .map_err(|_| ModuleError::BadSignature("trailer too large".into()))?;

        let mut out = zip_body;
        out.extend_from_slice(&l.to_le_bytes());
        out.extend_from_slice(&blob);
        Ok(out)
    }

    /// Strip a signature trailer off a previously-signed bundle, returning
    /// the bare zip body. Lets `signmodule` re-sign a bundle in place
    /// without accumulating trailers.
    pub fn strip_trailer(raw: &[u8]) -> ModuleResult<Vec<u8>> {
        let body_end = Self::locate_body_end(raw)
            .ok_or_else(|| ModuleError::BadSignature("no end-of-central-directory found".into()))?;
        Ok(raw[..body_end].to_vec())
    }

    /// Build a minimal zip archive (`manifest.yaml` plus the given script
    /// files) with an empty comment, ready for `sign`.
    pub fn build_zip(manifest_yaml: &str, files: &[(String, Vec<u8>)]) -> ModuleResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();

        writer
            .start_file("manifest.yaml", options)
            .map_err(|e| ModuleError::BadSignature(e.to_string()))?;
        writer
            .write_all(manifest_yaml.as_bytes())
            .map_err(|e| ModuleError::BadSignature(e.to_string()))?;

        for (name, contents) in files {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| ModuleError::BadSignature(e.to_string()))?;
            writer
                .write_all(contents)
                .map_err(|e| ModuleError::BadSignature(e.to_string()))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| ModuleError::BadSignature(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_and_verifies_a_bundle() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let zip_body = Bundle::build_zip("name: demo\n", &[("main.js".to_string(), b"print(1)".to_vec())]).unwrap();
        let signed = Bundle::sign(zip_body, &key).unwrap();

        let bundle = Bundle::parse(&signed).unwrap();
        assert!(bundle.verify_signature().unwrap());
        assert_eq!(bundle.read_entry("manifest.yaml").unwrap(), b"name: demo\n");
    }

    #[test]
    fn rejects_a_tampered_body() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let zip_body = Bundle::build_zip("name: demo\n", &[]).unwrap();
        let mut signed = Bundle::sign(zip_body, &key).unwrap();
        signed[0] ^= 0xFF;
        // A flipped leading byte corrupts the zip's local header, so
        // locating the EOCD either fails or the signature no longer
        // matches; both are rejections.
        match Bundle::parse(&signed) {
            Ok(bundle) => assert!(!bundle.verify_signature().unwrap()),
            Err(_) => {}
        }
    }

    #[test]
    fn rejects_a_truncated_trailer() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let zip_body = Bundle::build_zip("name: demo\n", &[]).unwrap();
        let signed = Bundle::sign(zip_body, &key).unwrap();
        let truncated = &signed[..signed.len() - 1];
        assert!(Bundle::parse(truncated).is_err());
    }

    #[test]
    fn strip_trailer_recovers_the_bare_zip_for_re_signing() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let zip_body = Bundle::build_zip("name: demo\n", &[]).unwrap();
        let signed = Bundle::sign(zip_body.clone(), &key).unwrap();
        let stripped = Bundle::strip_trailer(&signed).unwrap();
        assert_eq!(stripped, zip_body);

        let other_key = RsaPrivateKey::generate(2048).unwrap();
        let resigned = Bundle::sign(stripped, &other_key).unwrap();
        let bundle = Bundle::parse(&resigned).unwrap();
        assert!(bundle.verify_signature().unwrap());
        assert_eq!(bundle.trailer.pub_key, other_key.public_key());
    }

    #[test]
    fn lists_entry_names() {
        let key = RsaPrivateKey::generate(2048).unwrap();
        let zip_body = Bundle::build_zip(
            "name: demo\n",
            &[("lib/a.js".to_string(), b"1".to_vec()), ("lib/b.js".to_string(), b"2".to_vec())],
        )
        .unwrap();
        let signed = Bundle::sign(zip_body, &key).unwrap();
        let bundle = Bundle::parse(&signed).unwrap();
        let names = bundle.entry_names().unwrap();
        assert!(names.contains(&"lib/a.js".to_string()));
        assert!(names.contains(&"lib/b.js".to_string()));
    }
}
