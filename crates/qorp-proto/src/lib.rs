//! # qorp-proto
//!
//! Message taxonomy, node identity, and the canonical wire codec for the
//! QORP overlay mesh routing protocol.
//!
//! ## Modules
//!
//! - [`nodes`] — overlay addresses and the known/opaque node distinction
//! - [`messages`] — the four protocol message variants with their
//!   signing and verification rules
//! - [`wire`] — bit-exact frame serialisation and deserialisation
//!
//! The codec never verifies signatures; admission control belongs to the
//! forwarder. Conversely, message signing never touches the wire layer:
//! signatures cover the canonical signed-bytes layout, which the codec
//! embeds verbatim into frames.

pub mod messages;
pub mod nodes;
pub mod wire;

/// Error types for frame decoding.
///
/// A decode failure is never signalled to the peer; the transport drops
/// the frame and may report to an observability sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The frame's type tag does not name a known message variant.
    #[error("unknown message type tag {0:#04x}")]
    UnknownKind(u8),

    /// The frame is too short for the fixed-length fields of its variant.
    #[error("truncated frame: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A 32-byte key field does not decode as a valid Ed25519 point.
    #[error("invalid Ed25519 public key in frame")]
    InvalidKey,
}

pub type Result<T> = std::result::Result<T, DecodeError>;
