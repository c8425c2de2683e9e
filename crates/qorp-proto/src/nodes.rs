//! Node identity.
//!
//! A QORP node is identified by a 32-byte overlay address equal to the raw
//! bytes of its long-term Ed25519 verifying key. Two flavours of node
//! reference exist: a [`KnownNode`] carries the full verifying key and can
//! therefore authenticate messages; an opaque reference carries only the
//! address, and appears exclusively as the destination of a RouteRequest
//! whose initiator does not yet hold the target's key.
//!
//! Equality and hashing of every node flavour use only the address; the
//! verifying key is incidental metadata.

use std::fmt;
use std::hash::{Hash, Hasher};

use qorp_crypto::ed25519::VerifyingKey;
use qorp_crypto::Result as CryptoResult;

/// Length of an overlay address in bytes.
pub const ADDRESS_LENGTH: usize = 32;

/// A 32-byte overlay address (the raw Ed25519 public key of a node).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress([u8; ADDRESS_LENGTH]);

impl NodeAddress {
    /// Create an address from raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Get the raw bytes.
    pub fn to_bytes(self) -> [u8; ADDRESS_LENGTH] {
        self.0
    }
}

impl From<[u8; ADDRESS_LENGTH]> for NodeAddress {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddress({})", hex::encode(self.0))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A node whose full Ed25519 verifying key is locally known.
#[derive(Clone, Debug)]
pub struct KnownNode {
    key: VerifyingKey,
}

impl KnownNode {
    /// Create a known node from its verifying key.
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Create a known node from the raw bytes of its verifying key.
    ///
    /// Fails when the bytes are not a valid Ed25519 point.
    pub fn from_bytes(bytes: &[u8; ADDRESS_LENGTH]) -> CryptoResult<Self> {
        Ok(Self {
            key: VerifyingKey::from_bytes(bytes)?,
        })
    }

    /// The node's overlay address (raw verifying key bytes).
    pub fn address(&self) -> NodeAddress {
        NodeAddress(self.key.to_bytes())
    }

    /// The node's Ed25519 verifying key.
    pub fn key(&self) -> &VerifyingKey {
        &self.key
    }
}

impl PartialEq for KnownNode {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for KnownNode {}

impl Hash for KnownNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

/// Any node reference: fully known, or opaque (address only).
///
/// Opaque nodes may never originate a message; they only occur as the
/// destination of a RouteRequest.
#[derive(Clone, Debug)]
pub enum Node {
    /// A node with its full verifying key.
    Known(KnownNode),
    /// A node known only by its 32-byte address.
    Opaque(NodeAddress),
}

impl Node {
    /// The node's overlay address.
    pub fn address(&self) -> NodeAddress {
        match self {
            Node::Known(node) => node.address(),
            Node::Opaque(address) => *address,
        }
    }

    /// The full node, when known.
    pub fn as_known(&self) -> Option<&KnownNode> {
        match self {
            Node::Known(node) => Some(node),
            Node::Opaque(_) => None,
        }
    }
}

impl From<KnownNode> for Node {
    fn from(node: KnownNode) -> Self {
        Node::Known(node)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}
