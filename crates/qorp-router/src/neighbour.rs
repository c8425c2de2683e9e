//! Neighbour links.
//!
//! A neighbour is a directly reachable known node with a non-empty set of
//! outbound connections. The forwarder treats [`Neighbour::send`] as
//! best-effort and non-blocking; a connection that has gone away simply
//! swallows the frame.
//!
//! The node itself participates in routing as a pseudo-neighbour whose
//! link loops messages back into the local router instead of a transport.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use qorp_proto::messages::Message;
use qorp_proto::nodes::{KnownNode, NodeAddress};
use qorp_proto::wire;

/// Handle to one outbound transport connection.
///
/// The transport side owns the receiving half and is responsible for
/// flushing frames onto the network.
#[derive(Clone)]
pub struct Connection {
    frames: mpsc::UnboundedSender<Vec<u8>>,
}

impl Connection {
    /// Create a connection handle around a frame sink.
    pub fn new(frames: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { frames }
    }

    /// Enqueue an encoded frame for transmission. Best-effort.
    pub fn send_frame(&self, frame: Vec<u8>) {
        let _ = self.frames.send(frame);
    }
}

enum Link {
    /// Loopback for the node's own pseudo-neighbour entry.
    Local(mpsc::UnboundedSender<Message>),
    /// Outbound transport connections, used round-robin.
    Remote(Vec<Connection>),
}

/// A directly connected peer (or the node itself, see module docs).
pub struct Neighbour {
    node: KnownNode,
    link: Link,
    next_connection: AtomicUsize,
}

impl Neighbour {
    /// Create a neighbour reachable over the given transport connections.
    pub fn remote(node: KnownNode, connections: Vec<Connection>) -> Self {
        Self {
            node,
            link: Link::Remote(connections),
            next_connection: AtomicUsize::new(0),
        }
    }

    /// Create the node's own loopback pseudo-neighbour.
    pub(crate) fn local(node: KnownNode, inbox: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            node,
            link: Link::Local(inbox),
            next_connection: AtomicUsize::new(0),
        }
    }

    /// The neighbour's node identity.
    pub fn node(&self) -> &KnownNode {
        &self.node
    }

    /// The neighbour's overlay address.
    pub fn address(&self) -> NodeAddress {
        self.node.address()
    }

    /// Whether this is the node's own loopback pseudo-neighbour.
    pub fn is_local(&self) -> bool {
        matches!(self.link, Link::Local(_))
    }

    /// Send a message to this neighbour.
    ///
    /// Remote links encode the message and enqueue the frame on one of
    /// the connections, rotating through them; the loopback link hands
    /// the message to the local router.
    pub fn send(&self, message: &Message) {
        match &self.link {
            Link::Local(inbox) => {
                let _ = inbox.send(message.clone());
            }
            Link::Remote(connections) => {
                if connections.is_empty() {
                    tracing::warn!(neighbour = %self.address(), "no connections, dropping frame");
                    return;
                }
                let index =
                    self.next_connection.fetch_add(1, Ordering::Relaxed) % connections.len();
                connections[index].send_frame(wire::encode(message));
            }
        }
    }
}

impl PartialEq for Neighbour {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for Neighbour {}

impl fmt::Debug for Neighbour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neighbour")
            .field("address", &self.address())
            .field("local", &self.is_local())
            .finish()
    }
}
