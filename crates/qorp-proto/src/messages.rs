//! The four QORP message variants and their signing rules.
//!
//! Every message carries a known source, a destination, and a detachable
//! 64-byte Ed25519 signature produced by the source over the variant's
//! canonical signed-bytes layout. All integer fields are big-endian.
//!
//! | Variant        | Signed bytes                                            |
//! |----------------|---------------------------------------------------------|
//! | `NetworkData`  | `src_pub ‖ dst_pub ‖ nonce(12) ‖ length(2) ‖ payload`   |
//! | `RouteRequest` | `src_pub ‖ dst_field(32) ‖ x25519_pub(32)`              |
//! | `RouteResponse`| `src_pub ‖ dst_pub ‖ requester_key(32) ‖ x25519_pub(32)`|
//! | `RouteError`   | `src_pub ‖ dst_pub ‖ route_src(32) ‖ route_dst(32)`     |
//!
//! RouteRequest and RouteResponse equality ignores the signature: the
//! forwarder deduplicates in-flight requests and matches responses by
//! field value, and two honestly signed copies of the same request must
//! compare equal.

use qorp_crypto::ed25519::{KeyPair, Signature};
use qorp_crypto::x25519::X25519PublicKey;

use crate::nodes::{KnownNode, Node};

/// Length of a NetworkData nonce in bytes (ChaCha20-Poly1305).
pub const NONCE_LENGTH: usize = 12;

/// An authenticated-encrypted datagram carried along an established route.
///
/// `length` is informational and carried for the higher layer; the codec
/// neither truncates nor pads `payload` to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkData {
    pub source: KnownNode,
    pub destination: KnownNode,
    pub nonce: [u8; NONCE_LENGTH],
    pub length: u16,
    pub payload: Vec<u8>,
    pub signature: Option<Signature>,
}

impl NetworkData {
    /// Create an unsigned data message.
    pub fn new(
        source: KnownNode,
        destination: KnownNode,
        nonce: [u8; NONCE_LENGTH],
        length: u16,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source,
            destination,
            nonce,
            length,
            payload,
            signature: None,
        }
    }

    /// The canonical byte string covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + NONCE_LENGTH + 2 + self.payload.len());
        bytes.extend_from_slice(self.source.address().as_bytes());
        bytes.extend_from_slice(self.destination.address().as_bytes());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.length.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Sign with the source's identity.
    pub fn sign(&mut self, identity: &KeyPair) {
        self.signature = Some(identity.sign(&self.signed_bytes()));
    }

    /// Whether a signature is present and verifies under the source's key.
    pub fn verify(&self) -> bool {
        verify_with(&self.source, self.signature.as_ref(), &self.signed_bytes())
    }
}

/// A flooded request to discover a route towards `destination`.
///
/// Carries the requester's ephemeral X25519 public key; the destination
/// answers it in a [`RouteResponse`]. The destination may be opaque when
/// the initiator lacks the target's full Ed25519 key.
#[derive(Clone, Debug)]
pub struct RouteRequest {
    pub source: KnownNode,
    pub destination: Node,
    pub public_key: X25519PublicKey,
    pub signature: Option<Signature>,
}

impl RouteRequest {
    /// Create an unsigned route request.
    pub fn new(source: KnownNode, destination: Node, public_key: X25519PublicKey) -> Self {
        Self {
            source,
            destination,
            public_key,
            signature: None,
        }
    }

    /// The canonical byte string covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(96);
        bytes.extend_from_slice(self.source.address().as_bytes());
        bytes.extend_from_slice(self.destination.address().as_bytes());
        bytes.extend_from_slice(self.public_key.as_bytes());
        bytes
    }

    /// Sign with the source's identity.
    pub fn sign(&mut self, identity: &KeyPair) {
        self.signature = Some(identity.sign(&self.signed_bytes()));
    }

    /// Whether a signature is present and verifies under the source's key.
    pub fn verify(&self) -> bool {
        verify_with(&self.source, self.signature.as_ref(), &self.signed_bytes())
    }
}

impl PartialEq for RouteRequest {
    // Signature excluded: deduplication compares requests by value.
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.public_key == other.public_key
    }
}

impl Eq for RouteRequest {}

/// The destination's answer to a [`RouteRequest`], completing the key
/// agreement.
///
/// `requester_key` echoes the request's X25519 public key so relaying
/// nodes can match the response to the pending request it answers.
#[derive(Clone, Debug)]
pub struct RouteResponse {
    pub source: KnownNode,
    pub destination: KnownNode,
    pub requester_key: X25519PublicKey,
    pub public_key: X25519PublicKey,
    pub signature: Option<Signature>,
}

impl RouteResponse {
    /// Create an unsigned route response.
    pub fn new(
        source: KnownNode,
        destination: KnownNode,
        requester_key: X25519PublicKey,
        public_key: X25519PublicKey,
    ) -> Self {
        Self {
            source,
            destination,
            requester_key,
            public_key,
            signature: None,
        }
    }

    /// The canonical byte string covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(self.source.address().as_bytes());
        bytes.extend_from_slice(self.destination.address().as_bytes());
        bytes.extend_from_slice(self.requester_key.as_bytes());
        bytes.extend_from_slice(self.public_key.as_bytes());
        bytes
    }

    /// Sign with the source's identity.
    pub fn sign(&mut self, identity: &KeyPair) {
        self.signature = Some(identity.sign(&self.signed_bytes()));
    }

    /// Whether a signature is present and verifies under the source's key.
    pub fn verify(&self) -> bool {
        verify_with(&self.source, self.signature.as_ref(), &self.signed_bytes())
    }
}

impl PartialEq for RouteResponse {
    // Signature excluded, mirroring RouteRequest.
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.requester_key == other.requester_key
            && self.public_key == other.public_key
    }
}

impl Eq for RouteResponse {}

/// Notification that the route `(route_source, route_destination)` is no
/// longer usable from the emitting node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteError {
    pub source: KnownNode,
    pub destination: KnownNode,
    pub route_source: KnownNode,
    pub route_destination: KnownNode,
    pub signature: Option<Signature>,
}

impl RouteError {
    /// Create an unsigned route error.
    pub fn new(
        source: KnownNode,
        destination: KnownNode,
        route_source: KnownNode,
        route_destination: KnownNode,
    ) -> Self {
        Self {
            source,
            destination,
            route_source,
            route_destination,
            signature: None,
        }
    }

    /// The canonical byte string covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(self.source.address().as_bytes());
        bytes.extend_from_slice(self.destination.address().as_bytes());
        bytes.extend_from_slice(self.route_source.address().as_bytes());
        bytes.extend_from_slice(self.route_destination.address().as_bytes());
        bytes
    }

    /// Sign with the source's identity.
    pub fn sign(&mut self, identity: &KeyPair) {
        self.signature = Some(identity.sign(&self.signed_bytes()));
    }

    /// Whether a signature is present and verifies under the source's key.
    pub fn verify(&self) -> bool {
        verify_with(&self.source, self.signature.as_ref(), &self.signed_bytes())
    }
}

/// Any QORP protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Data(NetworkData),
    Request(RouteRequest),
    Response(RouteResponse),
    Error(RouteError),
}

impl Message {
    /// The message's source node.
    pub fn source(&self) -> &KnownNode {
        match self {
            Message::Data(m) => &m.source,
            Message::Request(m) => &m.source,
            Message::Response(m) => &m.source,
            Message::Error(m) => &m.source,
        }
    }

    /// The message's destination node.
    pub fn destination(&self) -> Node {
        match self {
            Message::Data(m) => Node::Known(m.destination.clone()),
            Message::Request(m) => m.destination.clone(),
            Message::Response(m) => Node::Known(m.destination.clone()),
            Message::Error(m) => Node::Known(m.destination.clone()),
        }
    }

    /// Sign with the source's identity.
    pub fn sign(&mut self, identity: &KeyPair) {
        match self {
            Message::Data(m) => m.sign(identity),
            Message::Request(m) => m.sign(identity),
            Message::Response(m) => m.sign(identity),
            Message::Error(m) => m.sign(identity),
        }
    }

    /// Whether a signature is present and verifies under the source's key.
    ///
    /// Returns `false` on a missing signature; never errors.
    pub fn verify(&self) -> bool {
        match self {
            Message::Data(m) => m.verify(),
            Message::Request(m) => m.verify(),
            Message::Response(m) => m.verify(),
            Message::Error(m) => m.verify(),
        }
    }
}

fn verify_with(source: &KnownNode, signature: Option<&Signature>, bytes: &[u8]) -> bool {
    match signature {
        Some(signature) => source.key().verify(bytes, signature).is_ok(),
        None => false,
    }
}
