//! Server-side session state: a fingerprint-keyed and an id-keyed map,
//! both behind `parking_lot::RwLock` so concurrent handshakes and command
//! dispatch never race over the same session table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::crypto::{RsaPublicKey, SymmetricKey};

/// One client's handshake progress and, once established, its symmetric
/// session key. A session outlives any individual HTTP connection.
pub struct SessionState {
    pub session_id: u64,
    pub client_key: RsaPublicKey,
    pub server_nonce: Vec<u8>,
    pub symmetric_key: RwLock<Option<Arc<SymmetricKey>>>,
}

impl SessionState {
    fn new(session_id: u64, client_key: RsaPublicKey, server_nonce: Vec<u8>) -> Self {
        Self {
            session_id,
            client_key,
            server_nonce,
            symmetric_key: RwLock::new(None),
        }
    }

    pub fn symmetric_key(&self) -> Option<Arc<SymmetricKey>> {
        self.symmetric_key.read().clone()
    }

    /// Lazily generate the session's `SymmetricKey` the first time it is
    /// needed, returning the (possibly freshly generated) key.
    pub fn get_or_generate_symmetric_key(&self) -> Arc<SymmetricKey> {
        if let Some(key) = self.symmetric_key() {
            return key;
        }
        let mut slot = self.symmetric_key.write();
        if let Some(key) = slot.as_ref() {
            return Arc::clone(key);
        }
        let key = Arc::new(SymmetricKey::generate());
        *slot = Some(Arc::clone(&key));
        key
    }
}

/// The server's session registry: fingerprint (client public key's long
/// `KeyAddress` bytes) to session, and session id to session, so a lookup
/// works from either the `/connect` leg or the `/command` leg.
pub struct SessionStore {
    by_fingerprint: RwLock<HashMap<Vec<u8>, Arc<SessionState>>>,
    by_id: RwLock<HashMap<u64, Arc<SessionState>>>,
    next_id: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            by_fingerprint: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn fingerprint(client_key: &RsaPublicKey) -> Vec<u8> {
        client_key.long_address().as_bytes().to_vec()
    }

    /// Look up or create the session for `client_key`, generating a fresh
    /// `server_nonce` only when the session is new.
    pub fn get_or_create(&self, client_key: RsaPublicKey, fresh_nonce: impl FnOnce() -> Vec<u8>) -> Arc<SessionState> {
        let fingerprint = Self::fingerprint(&client_key);
        if let Some(existing) = self.by_fingerprint.read().get(&fingerprint) {
            return Arc::clone(existing);
        }

        let mut by_fingerprint = self.by_fingerprint.write();
        if let Some(existing) = by_fingerprint.get(&fingerprint) {
            return Arc::clone(existing);
        }

        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(SessionState::new(session_id, client_key, fresh_nonce()));
        by_fingerprint.insert(fingerprint, Arc::clone(&session));
        self.by_id.write().insert(session_id, Arc::clone(&session));
        session
    }

    pub fn by_id(&self, session_id: u64) -> Option<Arc<SessionState>> {
        self.by_id.read().get(&session_id).cloned()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RsaPrivateKey;

    #[test]
    fn get_or_create_is_idempotent_per_key() {
        let store = SessionStore::new();
        let key = RsaPrivateKey::generate(2048).unwrap().public_key();
        let a = store.get_or_create(key.clone(), || vec![1, 2, 3]);
        let b = store.get_or_create(key, || vec![9, 9, 9]);
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.server_nonce, vec![1, 2, 3]);
    }

    #[test]
    fn by_id_finds_a_registered_session() {
        let store = SessionStore::new();
        let key = RsaPrivateKey::generate(2048).unwrap().public_key();
        let session = store.get_or_create(key, || vec![0]);
        let found = store.by_id(session.session_id).unwrap();
        assert_eq!(found.session_id, session.session_id);
    }

    #[test]
    fn symmetric_key_is_generated_once_and_cached() {
        let store = SessionStore::new();
        let key = RsaPrivateKey::generate(2048).unwrap().public_key();
        let session = store.get_or_create(key, || vec![0]);
        let k1 = session.get_or_generate_symmetric_key();
        let k2 = session.get_or_generate_symmetric_key();
        assert_eq!(k1.to_bytes(), k2.to_bytes());
    }
}
