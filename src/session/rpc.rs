//! The multipart request/reply wire shape shared by client and server: a
//! single `requestData` part carrying a Serializer-encoded mapping, and a
//! reply mapping wrapped in `{result: "ok"|"error", response: <inner>}`.

use crate::serializer::{decode, encode, Value};

use super::{SessionError, SessionResult};

pub const REQUEST_PART_NAME: &str = "requestData";

pub fn wrap_ok(response: Value) -> Value {
    Value::Mapping(vec![
        ("result".to_string(), Value::from("ok")),
        ("response".to_string(), response),
    ])
}

pub fn wrap_error(message: &str) -> Value {
    Value::Mapping(vec![
        ("result".to_string(), Value::from("error")),
        ("response".to_string(), Value::from(message)),
    ])
}

/// Encode `request` as the bytes of the `requestData` multipart part.
pub fn encode_request(request: &Value) -> Vec<u8> {
    encode(request)
}

/// Decode a raw reply body, unwrapping `{result, response}` into either
/// `Ok(response)` or `Err(SessionError::Remote(message))`.
pub fn decode_reply(bytes: &[u8]) -> SessionResult<Value> {
    let value = decode(bytes)?;
    let result = value
        .get("result")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SessionError::Transport("reply missing result field".into()))?;
    let response = value
        .get("response")
        .cloned()
        .ok_or_else(|| SessionError::Transport("reply missing response field".into()))?;
    if result == "ok" {
        Ok(response)
    } else {
        let message = response.as_str().unwrap_or("unknown error").to_string();
        Err(SessionError::Remote(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_unwraps_a_success_reply() {
        let reply = wrap_ok(Value::from("payload"));
        let bytes = encode(&reply);
        let unwrapped = decode_reply(&bytes).unwrap();
        assert_eq!(unwrapped, Value::from("payload"));
    }

    #[test]
    fn wraps_and_unwraps_an_error_reply() {
        let reply = wrap_error("bad signature");
        let bytes = encode(&reply);
        let err = decode_reply(&bytes).unwrap_err();
        assert!(matches!(err, SessionError::Remote(msg) if msg == "bad signature"));
    }
}
