//! Frontend boundary.
//!
//! Once a NetworkData datagram addressed to this node is admitted and its
//! payload authenticated and decrypted, the plaintext is handed across
//! this boundary. The frontend returns nothing synchronously; it may
//! later call back into the router to originate new data.

use qorp_proto::nodes::KnownNode;

/// A decrypted application payload with its overlay endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrontendData {
    pub source: KnownNode,
    pub destination: KnownNode,
    pub payload: Vec<u8>,
}

/// Receiver of inbound application payloads.
pub trait Frontend: Send + Sync {
    /// Called for every decrypted datagram addressed to this node.
    ///
    /// Must not block; hand off to a task for anything expensive.
    fn message_callback(&self, message: FrontendData);
}
