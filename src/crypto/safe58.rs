//! Safe58: a Base58-like codec with a visually-disambiguated alphabet.
//!
//! Alphabet: `123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz`
//! (58 characters: no `0`, `O`, `I`, or `l`). The non-strict decoding mode
//! transparently remaps `I|!l` to `1` and `O0` to `o` before decoding;
//! strict mode rejects inputs containing any of those characters.

use super::{CryptoError, CryptoResult};

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub struct Safe58;

impl Safe58 {
    /// Encode `bytes` to a Safe58 string, preserving leading-zero bytes as
    /// leading `'1'` characters (the alphabet's zero digit).
    pub fn encode(bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }
        let leading_zeros = bytes.iter().take_while(|&&b| b == 0).count();

        // divmod256-into-base58, big-endian, classic Base58 algorithm.
        // `digits` starts empty (not `[0]`): a leading zero byte carries 0
        // into an empty accumulator and leaves it empty, which is exactly
        // the "no digits yet" state the leading-zero count above already
        // accounts for.
        let mut digits: Vec<u8> = Vec::new();
        for &byte in bytes {
            let mut carry = byte as u32;
            for d in digits.iter_mut() {
                carry += (*d as u32) << 8;
                *d = (carry % 58) as u8;
                carry /= 58;
            }
            while carry > 0 {
                digits.push((carry % 58) as u8);
                carry /= 58;
            }
        }

        let mut out = String::new();
        out.extend(std::iter::repeat(ALPHABET[0] as char).take(leading_zeros));
        out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
        out
    }

    /// Strict decode: rejects any visually-ambiguous character.
    pub fn decode(s: &str) -> CryptoResult<Vec<u8>> {
        Self::decode_impl(s, false)
    }

    /// Non-strict decode: remaps `I`, `|`, `!`, `l` to `1` and `O`, `0` to
    /// `o` before decoding.
    pub fn decode_nonstrict(s: &str) -> CryptoResult<Vec<u8>> {
        Self::decode_impl(s, true)
    }

    fn decode_impl(s: &str, nonstrict: bool) -> CryptoResult<Vec<u8>> {
        let leading_ones = s.chars().take_while(|&c| c == '1').count();
        let mut digits: Vec<u8> = Vec::new();

        // The leading '1's already counted above are accounted for by the
        // `leading_ones` zero bytes prepended below; feeding them through
        // the accumulator again would double-count them as zero digits.
        for ch in s.chars().skip(leading_ones) {
            let remapped = if nonstrict {
                match ch {
                    'I' | '|' | '!' | 'l' => '1',
                    'O' | '0' => 'o',
                    other => other,
                }
            } else if matches!(ch, 'I' | '|' | '!' | 'l' | 'O' | '0') {
                return Err(CryptoError::Encoding(format!(
                    "character '{ch}' is not valid in strict Safe58"
                )));
            } else {
                ch
            };

            let value = ALPHABET
                .iter()
                .position(|&a| a as char == remapped)
                .ok_or_else(|| CryptoError::Encoding(format!("invalid Safe58 character '{ch}'")))?;

            let mut carry = value as u32;
            for d in digits.iter_mut() {
                carry += (*d as u32) * 58;
                *d = (carry & 0xff) as u8;
                carry >>= 8;
            }
            while carry > 0 {
                digits.push((carry & 0xff) as u8);
                carry >>= 8;
            }
        }

        let mut out = vec![0u8; leading_ones];
        out.extend(digits.iter().rev());
        Ok(out)
    }
}
