use std::collections::HashMap;

use super::value::Value;
use super::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKind {
    Bin,
    Text,
    Array,
    Binder,
}

/// Encodes `Value`s into the Boss wire format.
///
/// An `Encoder` starts in tree mode, where every freshly-seen string, byte
/// sequence, array, or mapping is registered in a back-reference cache keyed
/// by `(kind, bytes)` of its own encoded body, so repeated occurrences
/// collapse to a short reference record instead of being re-emitted in full.
pub struct Encoder {
    buf: Vec<u8>,
    cache: HashMap<(CacheKind, Vec<u8>), usize>,
    tree_mode: bool,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            cache: HashMap::new(),
            tree_mode: true,
        }
    }

    /// Switch to stream mode: emits the `STREAM_MODE` marker immediately and
    /// disables caching for every value written afterward.
    pub fn set_stream_mode(&mut self) {
        write_header(&mut self.buf, wire::TYPE_EXTRA, wire::XT_STREAM_MODE as u64);
        self.tree_mode = false;
    }

    /// Append the encoding of `value` to the buffer being built.
    pub fn write(&mut self, value: &Value) {
        let body = self.encode_node(value);
        self.buf.extend_from_slice(&body);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn encode_node(&mut self, value: &Value) -> Vec<u8> {
        match value {
            Value::Int(i) if *i >= 0 => {
                let mut out = Vec::new();
                write_header(&mut out, wire::TYPE_INT, *i as u64);
                out
            }
            Value::Int(i) => {
                let mut out = Vec::new();
                write_header(&mut out, wire::TYPE_NINT, i.unsigned_abs());
                out
            }
            Value::Bool(true) => extra(wire::XT_TTRUE),
            Value::Bool(false) => extra(wire::XT_FALSE),
            Value::Double(d) => encode_double(*d),
            Value::Time(t) => {
                let mut out = Vec::new();
                write_header(&mut out, wire::TYPE_EXTRA, wire::XT_TIME as u64);
                write_encoded_value(&mut out, *t);
                out
            }
            Value::String(s) => {
                let mut body = Vec::new();
                write_header(&mut body, wire::TYPE_TEXT, s.len() as u64);
                body.extend_from_slice(s.as_bytes());
                if s.is_empty() {
                    return body;
                }
                self.cache_or_reference(CacheKind::Text, s.as_bytes().to_vec(), body)
            }
            Value::Bytes(b) => {
                let mut body = Vec::new();
                write_header(&mut body, wire::TYPE_BIN, b.len() as u64);
                body.extend_from_slice(b);
                if b.is_empty() {
                    return body;
                }
                self.cache_or_reference(CacheKind::Bin, b.clone(), body)
            }
            Value::Array(items) => {
                let mut body = Vec::new();
                write_header(&mut body, wire::TYPE_LIST, items.len() as u64);
                for item in items {
                    let encoded = self.encode_node(item);
                    body.extend_from_slice(&encoded);
                }
                self.cache_or_reference(CacheKind::Array, body.clone(), body)
            }
            Value::Mapping(entries) => {
                let mut body = Vec::new();
                write_header(&mut body, wire::TYPE_DICT, entries.len() as u64);
                for (key, val) in entries {
                    let key_bytes = self.encode_node(&Value::String(key.clone()));
                    body.extend_from_slice(&key_bytes);
                    let val_bytes = self.encode_node(val);
                    body.extend_from_slice(&val_bytes);
                }
                self.cache_or_reference(CacheKind::Binder, body.clone(), body)
            }
        }
    }

    fn cache_or_reference(&mut self, kind: CacheKind, key: Vec<u8>, fresh_body: Vec<u8>) -> Vec<u8> {
        if !self.tree_mode {
            return fresh_body;
        }
        if let Some(&idx) = self.cache.get(&(kind, key.clone())) {
            let mut out = Vec::new();
            write_header(&mut out, wire::TYPE_CREF, idx as u64);
            out
        } else {
            let idx = self.cache.len();
            self.cache.insert((kind, key), idx);
            fresh_body
        }
    }
}

fn extra(code: u8) -> Vec<u8> {
    let mut out = Vec::new();
    write_header(&mut out, wire::TYPE_EXTRA, code as u64);
    out
}

fn encode_double(d: f64) -> Vec<u8> {
    if d == 0.0 {
        return extra(wire::XT_DZERO);
    }
    if d == 1.0 {
        return extra(wire::XT_DONE);
    }
    if d == -1.0 {
        return extra(wire::XT_DMINUSONE);
    }
    let mut out = Vec::new();
    write_header(&mut out, wire::TYPE_EXTRA, wire::XT_DOUBLE as u64);
    out.extend_from_slice(&d.to_le_bytes());
    out
}

fn bytes_needed(value: u64) -> usize {
    let mut n = 1;
    let mut v = value >> 8;
    while v > 0 {
        n += 1;
        v >>= 8;
    }
    n
}

/// Writes a header: low 3 bits of the first byte are `code`, the high 5
/// bits either hold `value` directly (when `value <= 22`) or encode
/// `23 + (N-1)` where `N` little-endian base-256 bytes follow and together
/// spell `value`.
pub(crate) fn write_header(out: &mut Vec<u8>, code: u8, value: u64) {
    if value <= 22 {
        out.push(code | ((value as u8) << 3));
        return;
    }
    let n = bytes_needed(value);
    let high = 23 + (n as u8 - 1);
    out.push(code | (high << 3));
    let bytes = value.to_le_bytes();
    out.extend_from_slice(&bytes[..n]);
}

/// Writes a bare encoded value (no meaningful type code, used for the
/// `TIME` extra's payload) using the same variable-length layout as
/// `write_header` with the code field fixed at zero.
pub(crate) fn write_encoded_value(out: &mut Vec<u8>, value: u64) {
    write_header(out, 0, value);
}
