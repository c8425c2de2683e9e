//! ChaCha20-Poly1305 sealing for datagram payloads (RFC 8439).
//!
//! Every NetworkData payload is sealed with the session key agreed
//! during route discovery, under a fresh random nonce per datagram. The
//! AAD is always empty in QORP: routing metadata travels in the clear
//! and is authenticated by the message's Ed25519 signature, not by the
//! cipher.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::{CryptoError, Result};

/// Session key length in bytes. An X25519 shared secret is exactly this
/// long, which is why it is adopted as the key without derivation.
pub const KEY_SIZE: usize = 32;

/// Nonce length in bytes; one fresh random nonce per datagram, carried
/// in the clear alongside the payload.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag appended to every sealed payload.
pub const TAG_SIZE: usize = 16;

/// Seal a datagram payload under a session key.
///
/// Returns the ciphertext with the 16-byte tag appended; this is the
/// byte string carried as the NetworkData payload field.
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    ChaCha20Poly1305::new(Key::from_slice(key))
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::InvalidInput("payload could not be sealed".into()))
}

/// Open a sealed datagram payload, authenticating the tag.
///
/// Fails when the payload was sealed under a different session key or
/// nonce, or was modified in flight.
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    ChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AeadDecryption)
}
