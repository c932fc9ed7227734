//! Boss binary serialization format.
//!
//! Boss is a tagged, back-reference-aware binary codec for a small
//! discriminated-union value universe: integers, strings, byte sequences,
//! arrays, mappings, doubles, booleans, and second-resolution timestamps.
//!
//! Two encoding modes exist. *Tree mode* (the default) remembers every
//! newly-seen string, byte sequence, array, and mapping in a cache and
//! re-emits later occurrences as a compact back-reference. *Stream mode*
//! turns caching off entirely, for encoding long sequences of independent
//! records without unbounded cache growth; a single `STREAM_MODE` marker
//! record announces the switch and the decoder picks it up automatically.
//!
//! ```rust,ignore
//! use u8core::serializer::{Value, encode, decode};
//!
//! let mut entries = Vec::new();
//! entries.push(("a".to_string(), Value::from("x")));
//! entries.push(("b".to_string(), Value::from("x")));
//! let encoded = encode(&Value::Mapping(entries));
//! let decoded = decode(&encoded).unwrap();
//! ```

mod decoder;
mod encoder;
mod value;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use value::Value;

use thiserror::Error;

/// Failures that can occur while decoding a Boss-encoded byte stream.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DecodingError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unknown type code: {0}")]
    UnknownTypeCode(u8),

    #[error("unknown extra subcode: {0}")]
    UnknownExtraCode(u8),

    #[error("invalid cache reference: {0}")]
    BadReference(usize),

    #[error("invalid UTF-8 in string record")]
    InvalidUtf8,

    #[error("mapping key was not a string")]
    NonStringKey,

    #[error("{0} trailing byte(s) after decoded value")]
    TrailingBytes(usize),
}

/// The 3-bit type codes that begin every Boss record header.
pub(crate) mod wire {
    pub const TYPE_INT: u8 = 0;
    pub const TYPE_EXTRA: u8 = 1;
    pub const TYPE_NINT: u8 = 2;
    pub const TYPE_TEXT: u8 = 3;
    pub const TYPE_BIN: u8 = 4;
    pub const TYPE_CREF: u8 = 5;
    pub const TYPE_LIST: u8 = 6;
    pub const TYPE_DICT: u8 = 7;

    pub const XT_DZERO: u8 = 1;
    pub const XT_DONE: u8 = 2;
    pub const XT_DMINUSONE: u8 = 4;
    pub const XT_DOUBLE: u8 = 7;
    pub const XT_TTRUE: u8 = 12;
    pub const XT_FALSE: u8 = 13;
    pub const XT_TIME: u8 = 15;
    pub const XT_STREAM_MODE: u8 = 16;
}

/// Encode a value in tree mode (the default, back-reference caching on).
pub fn encode(value: &Value) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write(value);
    enc.into_bytes()
}

/// Encode a sequence of values in stream mode: a `STREAM_MODE` marker is
/// emitted once, up front, and no back-reference caching occurs afterward.
pub fn encode_stream(values: &[Value]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.set_stream_mode();
    for v in values {
        enc.write(v);
    }
    enc.into_bytes()
}

/// Decode a single Boss-encoded value, requiring the input to be fully
/// consumed (no trailing bytes).
pub fn decode(data: &[u8]) -> Result<Value, DecodingError> {
    let mut dec = Decoder::new(data);
    let value = dec.read_value()?;
    let remaining = dec.remaining();
    if remaining > 0 {
        return Err(DecodingError::TrailingBytes(remaining));
    }
    Ok(value)
}

/// Decode every value in a stream-mode (or tree-mode) buffer until the
/// input is exhausted.
pub fn decode_all(data: &[u8]) -> Result<Vec<Value>, DecodingError> {
    let mut dec = Decoder::new(data);
    let mut out = Vec::new();
    while dec.remaining() > 0 {
        out.push(dec.read_value()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        for v in [
            Value::Int(0),
            Value::Int(-1),
            Value::Int(1),
            Value::Int(i64::MAX),
            Value::Int(i64::MIN + 1),
            Value::Bool(true),
            Value::Bool(false),
            Value::Double(0.0),
            Value::Double(1.0),
            Value::Double(-1.0),
            Value::Double(3.14159),
            Value::Time(1_700_000_000),
        ] {
            let encoded = encode(&v);
            assert_eq!(decode(&encoded).unwrap(), v);
        }
    }

    #[test]
    fn round_trips_strings_and_bytes() {
        let v = Value::String("hello, Universa".to_string());
        assert_eq!(decode(&encode(&v)).unwrap(), v);

        let v = Value::Bytes(vec![0, 1, 2, 255, 254]);
        assert_eq!(decode(&encode(&v)).unwrap(), v);

        let empty_str = Value::String(String::new());
        assert_eq!(decode(&encode(&empty_str)).unwrap(), empty_str);
    }

    #[test]
    fn round_trips_nested_structures() {
        let mapping = Value::Mapping(vec![
            ("a".to_string(), Value::from("x")),
            ("b".to_string(), Value::from("x")),
            (
                "c".to_string(),
                Value::Array(vec![Value::from("x"), Value::from("x")]),
            ),
        ]);
        let encoded = encode(&mapping);
        assert_eq!(decode(&encoded).unwrap(), mapping);
    }

    #[test]
    fn reference_caching_shrinks_repeated_strings() {
        let shared = Value::Array(vec![
            Value::from("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            Value::from("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            Value::from("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
        ]);
        let naive_len = 3 * (1 + 33);
        let encoded = encode(&shared);
        assert!(encoded.len() < naive_len);
    }

    #[test]
    fn empty_strings_are_never_cached() {
        let arr = Value::Array(vec![Value::from(""), Value::from("")]);
        let encoded = encode(&arr);
        assert_eq!(decode(&encoded).unwrap(), arr);
    }

    #[test]
    fn truncated_input_is_fatal() {
        let encoded = encode(&Value::String("hello".to_string()));
        let truncated = &encoded[..encoded.len() - 1];
        assert!(matches!(
            decode(truncated),
            Err(DecodingError::UnexpectedEof)
        ));
    }

    #[test]
    fn corrupted_header_surfaces_a_decoding_error() {
        let encoded = encode(&Value::Int(5));
        let mut corrupted = encoded.clone();
        corrupted[0] |= 0x05; // force TYPE_CREF with no cache entries
        assert!(matches!(
            decode(&corrupted),
            Err(DecodingError::BadReference(_)) | Err(DecodingError::UnexpectedEof)
        ));
    }

    #[test]
    fn stream_mode_disables_caching() {
        let values = vec![Value::from("x"), Value::from("x")];
        let encoded = encode_stream(&values);
        let decoded = decode_all(&encoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn out_of_range_reference_is_fatal() {
        let encoded = {
            let mut enc = Encoder::new();
            enc.write(&Value::from("x"));
            enc.into_bytes()
        };
        // Append a cache-reference header pointing past the single cached slot.
        let mut buf = encoded;
        buf.push((5u8) | (1u8 << 3));
        assert!(matches!(decode_all(&buf), Err(DecodingError::BadReference(1))));
    }
}
