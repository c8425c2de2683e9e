//! # qorp-crypto
//!
//! Cryptographic primitives for the QORP overlay mesh routing protocol.
//!
//! QORP uses a fixed cryptographic suite with no algorithm negotiation:
//!
//! - [`ed25519`] — Ed25519 signing and verification (RFC 8032); every
//!   protocol message is signed by its source node
//! - [`x25519`] — X25519 key agreement (RFC 7748) for end-to-end session
//!   negotiation during route discovery
//! - [`chacha20`] — ChaCha20-Poly1305 AEAD encryption (RFC 8439) for
//!   datagram payloads
//!
//! Public keys are serialised in their raw 32-byte form everywhere; there
//! is no ASN.1 wrapping and no length prefix.

pub mod chacha20;
pub mod ed25519;
pub mod x25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// AEAD decryption failed (authentication tag mismatch).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
