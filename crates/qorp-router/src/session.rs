//! Per-destination AEAD session keys.
//!
//! A session key is the 32-byte X25519 shared secret agreed during route
//! discovery, used directly as a ChaCha20-Poly1305 key. The table is
//! shared between the forwarder (which establishes inbound sessions when
//! answering route requests) and the router (which establishes outbound
//! sessions and seals/opens payloads).

use std::collections::HashMap;
use std::sync::Mutex;

use zeroize::Zeroize;

use qorp_crypto::chacha20::{self, KEY_SIZE, NONCE_SIZE};
use qorp_crypto::x25519::SharedSecret;
use qorp_crypto::Result as CryptoResult;
use qorp_proto::nodes::NodeAddress;

/// A 32-byte ChaCha20-Poly1305 session key.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; KEY_SIZE],
}

impl SessionKey {
    /// Adopt an X25519 shared secret as the session key.
    pub fn from_shared(shared: &SharedSecret) -> Self {
        Self {
            key: *shared.as_bytes(),
        }
    }

    /// Seal a plaintext payload. The ciphertext carries the 16-byte tag.
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        chacha20::seal(&self.key, nonce, plaintext)
    }

    /// Open a sealed payload, authenticating the tag.
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        chacha20::open(&self.key, nonce, ciphertext)
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Established sessions keyed by the far endpoint's address.
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<NodeAddress, SessionKey>>,
}

impl SessionTable {
    /// Install a session, replacing any previous key for the peer.
    pub fn insert(&self, peer: NodeAddress, key: SessionKey) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(peer, key);
        }
    }

    /// Fetch the session key for a peer.
    pub fn get(&self, peer: &NodeAddress) -> Option<SessionKey> {
        self.sessions.lock().ok()?.get(peer).cloned()
    }

    /// Whether a session is established with the peer.
    pub fn contains(&self, peer: &NodeAddress) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(peer))
            .unwrap_or(false)
    }

    /// Drop the session for a peer.
    pub fn remove(&self, peer: &NodeAddress) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorp_crypto::x25519::X25519StaticSecret;

    fn agreed_keys() -> (SessionKey, SessionKey) {
        let a = X25519StaticSecret::random();
        let b = X25519StaticSecret::random();
        let shared_a = a.diffie_hellman(&b.public_key());
        let shared_b = b.diffie_hellman(&a.public_key());
        (
            SessionKey::from_shared(&shared_a),
            SessionKey::from_shared(&shared_b),
        )
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (ours, theirs) = agreed_keys();
        let nonce = [0x11u8; NONCE_SIZE];
        let sealed = ours.seal(&nonce, b"datagram").expect("seal");
        let opened = theirs.open(&nonce, &sealed).expect("open");
        assert_eq!(opened, b"datagram");
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (ours, theirs) = agreed_keys();
        let nonce = [0x11u8; NONCE_SIZE];
        let mut sealed = ours.seal(&nonce, b"datagram").expect("seal");
        sealed[0] ^= 0x01;
        assert!(theirs.open(&nonce, &sealed).is_err());
    }

    #[test]
    fn test_table_insert_get_remove() {
        let table = SessionTable::default();
        let peer = NodeAddress::new([9u8; 32]);
        assert!(!table.contains(&peer));

        let (key, _) = agreed_keys();
        table.insert(peer, key);
        assert!(table.contains(&peer));
        assert!(table.get(&peer).is_some());

        table.remove(&peer);
        assert!(!table.contains(&peer));
    }
}
