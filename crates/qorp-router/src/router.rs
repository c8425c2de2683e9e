//! The QORP node: identity, sessions, forwarder, and the frontend bridge.
//!
//! A [`Router`] owns the Ed25519 identity keypair, the session table, and
//! the [`MessageForwarder`]. Messages that the forwarder routes to the
//! node itself arrive through the loopback pseudo-neighbour and are
//! drained by a background task that decrypts data payloads and hands
//! them to the [`Frontend`].

use std::sync::Arc;

use rand::RngCore;
use tokio::sync::mpsc;

use qorp_crypto::chacha20::{NONCE_SIZE, TAG_SIZE};
use qorp_crypto::ed25519::KeyPair;
use qorp_proto::messages::{Message, NetworkData};
use qorp_proto::nodes::{KnownNode, Node, NodeAddress};

use crate::config::RouterConfig;
use crate::forwarder::MessageForwarder;
use crate::frontend::{Frontend, FrontendData};
use crate::neighbour::Neighbour;
use crate::session::SessionTable;
use crate::{Result, RouterError};

/// A single QORP node.
pub struct Router {
    identity: KeyPair,
    local: KnownNode,
    forwarder: MessageForwarder,
    sessions: Arc<SessionTable>,
}

impl Router {
    /// Create a node from its persisted 32-byte Ed25519 identity seed.
    ///
    /// Spawns the loopback delivery task; requires a running tokio
    /// runtime.
    pub fn new(secret: [u8; 32], frontend: Arc<dyn Frontend>, config: RouterConfig) -> Arc<Self> {
        Self::from_keypair(KeyPair::from_seed(&secret), frontend, config)
    }

    /// Create a node with a freshly generated identity.
    pub fn generate(frontend: Arc<dyn Frontend>, config: RouterConfig) -> Arc<Self> {
        Self::from_keypair(KeyPair::generate(), frontend, config)
    }

    fn from_keypair(
        keypair: KeyPair,
        frontend: Arc<dyn Frontend>,
        config: RouterConfig,
    ) -> Arc<Self> {
        let local = KnownNode::new(keypair.verifying_key());
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let self_neighbour = Arc::new(Neighbour::local(local.clone(), inbox_tx));
        let sessions = Arc::new(SessionTable::default());
        let forwarder =
            MessageForwarder::new(keypair.clone(), self_neighbour, sessions.clone(), config);
        tokio::spawn(Self::deliver_inbox(
            local.clone(),
            sessions.clone(),
            frontend,
            inbox_rx,
        ));
        Arc::new(Self {
            identity: keypair,
            local,
            forwarder,
            sessions,
        })
    }

    /// The node's identity.
    pub fn local_node(&self) -> &KnownNode {
        &self.local
    }

    /// The node's overlay address.
    pub fn address(&self) -> NodeAddress {
        self.local.address()
    }

    /// The node's routing engine.
    pub fn forwarder(&self) -> &MessageForwarder {
        &self.forwarder
    }

    /// Register a directly connected peer.
    pub fn add_neighbour(&self, neighbour: Arc<Neighbour>) {
        self.forwarder.add_neighbour(neighbour);
    }

    /// Drop a peer and every route through it.
    pub fn remove_neighbour(&self, address: &NodeAddress) {
        self.forwarder.remove_neighbour(address);
    }

    /// Whether a session key is established with the peer.
    pub fn has_session(&self, peer: &NodeAddress) -> bool {
        self.sessions.contains(peer)
    }

    /// Send an application payload to `destination`.
    ///
    /// Discovers a route (and with it a session key) when none is known,
    /// seals the payload with the session key under a fresh random nonce,
    /// signs the datagram, and dispatches it towards the destination.
    pub async fn send_data(&self, destination: &KnownNode, payload: &[u8]) -> Result<()> {
        if payload.len() + TAG_SIZE > usize::from(u16::MAX) {
            return Err(RouterError::PayloadTooLarge(payload.len()));
        }

        let direction = self
            .forwarder
            .find_direction(&Node::Known(destination.clone()), None)
            .await?;
        let Some(session) = self.sessions.get(&destination.address()) else {
            return Err(RouterError::MissingSession(destination.address()));
        };

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = session.seal(&nonce, payload)?;
        let length = ciphertext.len() as u16;

        let mut data = NetworkData::new(
            self.local.clone(),
            destination.clone(),
            nonce,
            length,
            ciphertext,
        );
        data.sign(&self.identity);
        direction.send(&Message::Data(data));
        Ok(())
    }

    /// Drain the loopback pseudo-neighbour.
    ///
    /// Data addressed to this node is decrypted and handed to the
    /// frontend. Flood copies of routing messages addressed elsewhere
    /// also end up here and are discarded.
    async fn deliver_inbox(
        local: KnownNode,
        sessions: Arc<SessionTable>,
        frontend: Arc<dyn Frontend>,
        mut inbox: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(message) = inbox.recv().await {
            let Message::Data(data) = message else {
                continue;
            };
            if data.destination.address() != local.address() {
                continue;
            }
            let source = data.source.address();
            let Some(session) = sessions.get(&source) else {
                tracing::warn!(%source, "data without an established session, dropping");
                continue;
            };
            match session.open(&data.nonce, &data.payload) {
                Ok(payload) => frontend.message_callback(FrontendData {
                    source: data.source,
                    destination: data.destination,
                    payload,
                }),
                Err(err) => {
                    tracing::warn!(%source, %err, "payload failed authentication, dropping");
                }
            }
        }
    }
}
