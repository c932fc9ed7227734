//! `SessionClient`: the three-leg handshake plus symmetric-encrypted
//! command RPC, driven over `reqwest`'s `multipart/form-data`.

use std::sync::Arc;

use parking_lot::RwLock;
use rand::RngCore;
use reqwest::multipart;

use crate::crypto::{HashAlg, RsaPrivateKey, RsaPublicKey, SymmetricKey};
use crate::serializer::Value;

use super::rpc::{decode_reply, encode_request, REQUEST_PART_NAME};
use super::{SessionError, SessionResult};

const CLIENT_NONCE_LEN: usize = 47;

/// A handshake-and-RPC client for one server endpoint. `reqwest::Client`'s
/// own connection pool is relied on rather than re-implemented.
pub struct SessionClient {
    base_url: String,
    http: reqwest::Client,
    private_key: RsaPrivateKey,
    server_public_key: RsaPublicKey,
    session_id: RwLock<Option<u64>>,
    symmetric_key: RwLock<Option<Arc<SymmetricKey>>>,
}

impl SessionClient {
    pub fn new(base_url: impl Into<String>, private_key: RsaPrivateKey, server_public_key: RsaPublicKey) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            private_key,
            server_public_key,
            session_id: RwLock::new(None),
            symmetric_key: RwLock::new(None),
        }
    }

    async fn post(&self, path: &str, request: &Value) -> SessionResult<Value> {
        let bytes = encode_request(request);
        let part = multipart::Part::bytes(bytes).file_name("request.boss");
        let form = multipart::Form::new().part(REQUEST_PART_NAME, part);

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        decode_reply(&body)
    }

    /// Run all three handshake legs, adopting the resulting symmetric key.
    pub async fn handshake(&self) -> SessionResult<()> {
        // Leg 1: connect.
        let connect_request = Value::Mapping(vec![(
            "client_key".to_string(),
            self.private_key.public_key().pack(),
        )]);
        let connect_reply = self.post("/connect", &connect_request).await?;

        let server_nonce = connect_reply
            .get("server_nonce")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| SessionError::Transport("missing server_nonce".into()))?
            .to_vec();
        let session_id = connect_reply
            .get("session_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SessionError::Transport("missing session_id".into()))? as u64;

        // Leg 2: get-token.
        let mut client_nonce = vec![0u8; CLIENT_NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut client_nonce);

        let nonce_pair = Value::Mapping(vec![
            ("client_nonce".to_string(), Value::Bytes(client_nonce.clone())),
            ("server_nonce".to_string(), Value::Bytes(server_nonce.clone())),
        ]);
        let serialized_pair = crate::serializer::encode(&nonce_pair);
        let signature = self.private_key.sign(&serialized_pair, HashAlg::Sha512)?;

        let token_request = Value::Mapping(vec![
            ("data".to_string(), Value::Bytes(serialized_pair)),
            ("signature".to_string(), Value::Bytes(signature)),
            ("session_id".to_string(), Value::Int(session_id as i64)),
        ]);
        let token_reply = self.post("/get_token", &token_request).await?;

        // Leg 3: verify.
        let server_data = token_reply
            .get("data")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| SessionError::Transport("missing data".into()))?;
        let server_signature = token_reply
            .get("signature")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| SessionError::Transport("missing signature".into()))?;

        if !self
            .server_public_key
            .verify(server_data, server_signature, HashAlg::Sha512)?
        {
            return Err(SessionError::BadSignature);
        }

        let parsed = crate::serializer::decode(server_data)?;
        let echoed_nonce = parsed
            .get("client_nonce")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| SessionError::Transport("missing client_nonce in server reply".into()))?;
        if echoed_nonce != client_nonce.as_slice() {
            return Err(SessionError::BadNonce);
        }

        let encrypted_token = parsed
            .get("encrypted_token")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| SessionError::Transport("missing encrypted_token".into()))?;
        let decrypted = self.private_key.decrypt(encrypted_token)?;
        let token_value = crate::serializer::decode(&decrypted)?;
        let sk_bytes = token_value
            .get("sk")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| SessionError::Transport("missing sk".into()))?;

        let key = SymmetricKey::from_bytes(sk_bytes)?;
        *self.symmetric_key.write() = Some(Arc::new(key));
        *self.session_id.write() = Some(session_id);
        Ok(())
    }

    /// Issue a symmetric-encrypted command RPC. The handshake must have
    /// completed first.
    pub async fn command(&self, command: &str, params: Value) -> SessionResult<Value> {
        let session_id = self.session_id.read().ok_or(SessionError::KeyMismatch)?;
        let key = self
            .symmetric_key
            .read()
            .clone()
            .ok_or(SessionError::KeyMismatch)?;

        let inner = Value::Mapping(vec![
            ("command".to_string(), Value::from(command)),
            ("params".to_string(), params),
        ]);
        let serialized = crate::serializer::encode(&inner);
        let encrypted = key.encrypt(&serialized);

        let request = Value::Mapping(vec![
            ("command".to_string(), Value::from("command")),
            ("params".to_string(), Value::Bytes(encrypted)),
            ("session_id".to_string(), Value::Int(session_id as i64)),
        ]);

        let reply = self.post("/command", &request).await?;
        let encrypted_reply = reply
            .as_bytes()
            .ok_or_else(|| SessionError::Transport("command reply was not bytes".into()))?;
        let decrypted = key.decrypt(encrypted_reply)?;
        Ok(crate::serializer::decode(&decrypted)?)
    }
}
