//! # qorp-router
//!
//! The per-node routing engine for the QORP overlay mesh.
//!
//! ## Architecture
//!
//! ```text
//! Transport connection
//!     |  frames
//!     v
//! wire::decode (qorp-proto)
//!     |  messages
//!     v
//! MessageForwarder (forwarder.rs)  -- admission, dispatch, pending requests
//!     |  loopback for destination == self
//!     v
//! Router (router.rs)               -- sessions, payload decryption
//!     |  plaintext
//!     v
//! Frontend (frontend.rs)
//! ```
//!
//! ## Modules
//!
//! - [`config`] — runtime knobs (RREQ timeout)
//! - [`neighbour`] — outbound send channel to a directly connected peer
//! - [`forwarder`] — route discovery, deduplication, path maintenance,
//!   error propagation
//! - [`session`] — per-destination AEAD session keys
//! - [`router`] — node identity, payload encryption, frontend bridge
//! - [`frontend`] — decrypted payload hand-off boundary

pub mod config;
pub mod forwarder;
pub mod frontend;
pub mod neighbour;
pub mod router;
pub mod session;

use qorp_proto::nodes::NodeAddress;

/// Error types for routing operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No RouteResponse arrived before the request's TTL fired.
    #[error("route request timed out")]
    RouteRequestTimeout,

    /// A payload does not fit in a single data frame.
    #[error("payload too large for a data frame: {0} bytes")]
    PayloadTooLarge(usize),

    /// No session key is established with the peer.
    #[error("no session key for {0}")]
    MissingSession(NodeAddress),

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] qorp_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
