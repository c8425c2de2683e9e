//! The message forwarder: route discovery, deduplication, path
//! maintenance, and error propagation.
//!
//! All dispatch is synchronous and never suspends; the only awaitable
//! operation is [`MessageForwarder::find_direction`]. Internal state is
//! guarded by a single mutex, so dispatch methods and timer callbacks are
//! serialised and route installation is observable before any subsequent
//! ingress is processed.
//!
//! ## Dispatch rules
//!
//! - **Admission**: every message arriving from a neighbour other than
//!   the node itself must carry a valid source signature; forgeries are
//!   dropped silently.
//! - **NetworkData** follows the installed route for its
//!   `(source, destination)` pair and is only forwarded when it arrives
//!   from the route's source-side neighbour; an unknown pair is answered
//!   with a signed RouteError to the ingress neighbour.
//! - **RouteRequest** is answered directly when it targets this node,
//!   forwarded when a direction is already known, and otherwise parked in
//!   the pending table. Only the first pending request for a target is
//!   flooded to the other neighbours (split-horizon with deduplication).
//! - **RouteResponse** fulfils every pending request for its target once
//!   one of them matches by requester key: the route is installed through
//!   the ingress neighbour and the response is relayed to the remaining
//!   neighbours still awaiting it.
//! - **RouteError** is honoured only when it arrives from the
//!   destination-side neighbour of the named route; both directions of
//!   the route are torn down and the error is relayed towards the
//!   route's source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;

use qorp_crypto::ed25519::KeyPair;
use qorp_crypto::x25519::{ephemeral_key_exchange, X25519StaticSecret};
use qorp_proto::messages::{Message, NetworkData, RouteError, RouteRequest, RouteResponse};
use qorp_proto::nodes::{KnownNode, Node, NodeAddress};
use qorp_proto::wire;

use crate::config::RouterConfig;
use crate::neighbour::Neighbour;
use crate::session::{SessionKey, SessionTable};
use crate::{Result, RouterError};

/// An ordered `(source, destination)` route endpoint pair.
type RoutePair = (NodeAddress, NodeAddress);

/// A fulfilled route request: the neighbour the response arrived from,
/// and the response itself.
type RouteInfo = (Arc<Neighbour>, RouteResponse);

/// Next hops for an installed route.
#[derive(Clone)]
struct RouteEntry {
    towards_source: Arc<Neighbour>,
    towards_destination: Arc<Neighbour>,
}

/// An outstanding route request awaiting its response.
///
/// The originating request is kept here (rather than in a weak side
/// table) and is erased together with the slot on every terminal
/// transition: fulfilment, timeout, or cancellation.
struct PendingRequest {
    id: u64,
    request: RouteRequest,
    reply: oneshot::Sender<RouteInfo>,
}

#[derive(Default)]
struct ForwarderState {
    neighbours: HashMap<NodeAddress, Arc<Neighbour>>,
    routes: HashMap<RoutePair, RouteEntry>,
    directions: HashMap<NodeAddress, Arc<Neighbour>>,
    pending_requests: HashMap<NodeAddress, Vec<PendingRequest>>,
}

struct ForwarderInner {
    identity: KeyPair,
    local: KnownNode,
    self_neighbour: Arc<Neighbour>,
    sessions: Arc<SessionTable>,
    config: RouterConfig,
    state: Mutex<ForwarderState>,
    next_request_id: AtomicU64,
}

/// The routing engine of a single node.
///
/// Cheap to clone; clones share the same routing state.
#[derive(Clone)]
pub struct MessageForwarder {
    inner: Arc<ForwarderInner>,
}

enum RequestAction {
    /// A direction is already known; relay without flooding.
    Forward(Arc<Neighbour>),
    /// First pending request for the target; flood to these neighbours.
    Flood(u64, Vec<Arc<Neighbour>>),
    /// A flood is already in flight; piggyback on it.
    Coalesce(u64),
}

impl MessageForwarder {
    /// Create a forwarder for the given identity.
    ///
    /// The node itself is seeded as a pseudo-neighbour with a self-route
    /// and a self-direction, so the dispatch rules apply uniformly when
    /// this node is the ultimate source or destination.
    pub(crate) fn new(
        identity: KeyPair,
        self_neighbour: Arc<Neighbour>,
        sessions: Arc<SessionTable>,
        config: RouterConfig,
    ) -> Self {
        let local = KnownNode::new(identity.verifying_key());
        let address = local.address();
        let mut state = ForwarderState::default();
        state.neighbours.insert(address, self_neighbour.clone());
        state.routes.insert(
            (address, address),
            RouteEntry {
                towards_source: self_neighbour.clone(),
                towards_destination: self_neighbour.clone(),
            },
        );
        state.directions.insert(address, self_neighbour.clone());
        Self {
            inner: Arc::new(ForwarderInner {
                identity,
                local,
                self_neighbour,
                sessions,
                config,
                state: Mutex::new(state),
                next_request_id: AtomicU64::new(0),
            }),
        }
    }

    /// The node identity this forwarder routes for.
    pub fn local_node(&self) -> &KnownNode {
        &self.inner.local
    }

    /// Register a directly connected peer.
    pub fn add_neighbour(&self, neighbour: Arc<Neighbour>) {
        let address = neighbour.address();
        self.state().neighbours.insert(address, neighbour);
        tracing::debug!(%address, "neighbour added");
    }

    /// Drop a peer, purging routes and directions that pass through it.
    pub fn remove_neighbour(&self, address: &NodeAddress) {
        let mut state = self.state();
        if state.neighbours.remove(address).is_none() {
            return;
        }
        state.routes.retain(|_, entry| {
            entry.towards_source.address() != *address
                && entry.towards_destination.address() != *address
        });
        state.directions.retain(|_, via| via.address() != *address);
        drop(state);
        tracing::debug!(%address, "neighbour removed");
    }

    /// The preferred next hop towards a node, when one is known.
    pub fn direction(&self, node: &NodeAddress) -> Option<Arc<Neighbour>> {
        self.state().directions.get(node).cloned()
    }

    /// The installed next-hop pair for a route, when present.
    ///
    /// Returns `(towards_source, towards_destination)`.
    pub fn route(
        &self,
        source: &NodeAddress,
        destination: &NodeAddress,
    ) -> Option<(Arc<Neighbour>, Arc<Neighbour>)> {
        self.state()
            .routes
            .get(&(*source, *destination))
            .map(|entry| {
                (
                    entry.towards_source.clone(),
                    entry.towards_destination.clone(),
                )
            })
    }

    /// Install a static route entry.
    pub fn install_route(
        &self,
        source: NodeAddress,
        destination: NodeAddress,
        towards_source: Arc<Neighbour>,
        towards_destination: Arc<Neighbour>,
    ) {
        self.state().routes.insert(
            (source, destination),
            RouteEntry {
                towards_source,
                towards_destination,
            },
        );
    }

    /// Whether any route request for a node is still outstanding.
    pub fn has_pending_request(&self, node: &NodeAddress) -> bool {
        self.state()
            .pending_requests
            .get(node)
            .is_some_and(|slots| !slots.is_empty())
    }

    /// Transport ingress: decode a frame and ingest it.
    ///
    /// Malformed frames are dropped without signalling the peer.
    pub fn ingest_frame(&self, from: &Arc<Neighbour>, frame: &[u8]) {
        match wire::decode(frame) {
            Ok(message) => self.ingest(from, message),
            Err(err) => {
                tracing::debug!(from = %from.address(), %err, "dropping undecodable frame");
            }
        }
    }

    /// Ingest one message from a neighbour.
    ///
    /// Messages originated locally (ingress via the self pseudo-neighbour)
    /// skip signature verification; everything else must verify.
    pub fn ingest(&self, from: &Arc<Neighbour>, message: Message) {
        if from.address() != self.inner.local.address() && !message.verify() {
            tracing::debug!(
                from = %from.address(),
                "dropping message with missing or invalid signature"
            );
            return;
        }
        match message {
            Message::Data(data) => self.handle_data(from, data),
            Message::Request(request) => self.handle_request(from, request),
            Message::Response(response) => self.handle_response(from, response),
            Message::Error(error) => self.handle_error(from, error),
        }
    }

    /// Discover (or recall) the next hop towards a node.
    ///
    /// When no direction is known, an ephemeral X25519 keypair is
    /// generated, a signed RouteRequest is broadcast to every neighbour,
    /// and the call suspends until the matching RouteResponse arrives or
    /// the TTL fires. On success the X25519 exchange is completed and the
    /// session key for the target node is installed.
    pub async fn find_direction(
        &self,
        node: &Node,
        timeout: Option<Duration>,
    ) -> Result<Arc<Neighbour>> {
        let destination = node.address();
        if let Some(direction) = self.direction(&destination) {
            return Ok(direction);
        }

        let secret = X25519StaticSecret::random();
        let public_key = secret.public_key();
        let mut request = RouteRequest::new(
            self.inner.local.clone(),
            node.clone(),
            public_key.clone(),
        );
        request.sign(&self.inner.identity);

        let (id, receiver, recipients) = {
            let mut state = self.state();
            let (sender, receiver) = oneshot::channel();
            let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
            state
                .pending_requests
                .entry(destination)
                .or_default()
                .push(PendingRequest {
                    id,
                    request: request.clone(),
                    reply: sender,
                });
            let recipients: Vec<_> = state.neighbours.values().cloned().collect();
            (id, receiver, recipients)
        };
        self.arm_request_ttl(destination, id);

        tracing::debug!(%destination, "originating route request");
        let message = Message::Request(request);
        for neighbour in recipients {
            neighbour.send(&message);
        }

        let ttl = timeout.unwrap_or_else(|| self.inner.config.rreq_timeout());
        match tokio::time::timeout(ttl, receiver).await {
            Ok(Ok((direction, response))) => {
                if response.requester_key == public_key {
                    let shared = secret.diffie_hellman(&response.public_key);
                    self.inner
                        .sessions
                        .insert(response.source.address(), SessionKey::from_shared(&shared));
                } else {
                    // Chain-fulfilled by a response to a concurrent
                    // request; the direction is valid but the key
                    // exchange belongs to the other requester.
                    tracing::warn!(
                        %destination,
                        "route response answered a concurrent request, no session established"
                    );
                }
                Ok(direction)
            }
            Ok(Err(_)) | Err(_) => {
                self.remove_request(destination, id);
                Err(RouterError::RouteRequestTimeout)
            }
        }
    }

    fn handle_data(&self, from: &Arc<Neighbour>, data: NetworkData) {
        let pair = (data.source.address(), data.destination.address());
        let entry = self.state().routes.get(&pair).cloned();
        let Some(entry) = entry else {
            tracing::debug!(
                source = %pair.0,
                destination = %pair.1,
                "no route for data, replying with route error"
            );
            let mut error = RouteError::new(
                self.inner.local.clone(),
                from.node().clone(),
                data.source,
                data.destination,
            );
            error.sign(&self.inner.identity);
            from.send(&Message::Error(error));
            return;
        };
        if entry.towards_source.address() == from.address() {
            entry.towards_destination.send(&Message::Data(data));
        } else {
            tracing::debug!(
                from = %from.address(),
                source = %pair.0,
                destination = %pair.1,
                "dropping data arriving from off-route neighbour"
            );
        }
    }

    fn handle_request(&self, from: &Arc<Neighbour>, request: RouteRequest) {
        if request.destination.address() == self.inner.local.address() {
            self.respond_as_destination(from, &request);
            return;
        }

        let destination = request.destination.address();
        let action = {
            let mut state = self.state();
            if let Some(direction) = state.directions.get(&destination) {
                RequestAction::Forward(direction.clone())
            } else {
                let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
                // The receiving half is dropped: a relayed request has no
                // local awaiter, its fulfilment effects happen in
                // handle_response.
                let (sender, _receiver) = oneshot::channel();
                let slots = state.pending_requests.entry(destination).or_default();
                let first = slots.is_empty();
                slots.push(PendingRequest {
                    id,
                    request: request.clone(),
                    reply: sender,
                });
                if first {
                    let recipients = state
                        .neighbours
                        .values()
                        .filter(|neighbour| neighbour.address() != from.address())
                        .cloned()
                        .collect();
                    RequestAction::Flood(id, recipients)
                } else {
                    RequestAction::Coalesce(id)
                }
            }
        };

        match action {
            RequestAction::Forward(direction) => {
                direction.send(&Message::Request(request));
            }
            RequestAction::Flood(id, recipients) => {
                self.arm_request_ttl(destination, id);
                tracing::debug!(
                    %destination,
                    fanout = recipients.len(),
                    "flooding route request"
                );
                let message = Message::Request(request);
                for neighbour in recipients {
                    neighbour.send(&message);
                }
            }
            RequestAction::Coalesce(id) => {
                self.arm_request_ttl(destination, id);
                tracing::debug!(%destination, "coalescing duplicate route request");
            }
        }
    }

    /// Answer a route request addressed to this node.
    ///
    /// Completes the X25519 exchange, installs the inbound session and
    /// the one-hop route pair, and replies to the ingress neighbour.
    fn respond_as_destination(&self, from: &Arc<Neighbour>, request: &RouteRequest) {
        let (public_key, shared) = ephemeral_key_exchange(&request.public_key);
        self.inner
            .sessions
            .insert(request.source.address(), SessionKey::from_shared(&shared));

        let requester = request.source.address();
        let local = self.inner.local.address();
        {
            let mut state = self.state();
            state.routes.insert(
                (requester, local),
                RouteEntry {
                    towards_source: from.clone(),
                    towards_destination: self.inner.self_neighbour.clone(),
                },
            );
            state.routes.insert(
                (local, requester),
                RouteEntry {
                    towards_source: self.inner.self_neighbour.clone(),
                    towards_destination: from.clone(),
                },
            );
            state
                .directions
                .entry(requester)
                .or_insert_with(|| from.clone());
        }

        let mut response = RouteResponse::new(
            self.inner.local.clone(),
            request.source.clone(),
            request.public_key.clone(),
            public_key,
        );
        response.sign(&self.inner.identity);
        tracing::debug!(%requester, "answering route request for this node");
        from.send(&Message::Response(response));
    }

    fn handle_response(&self, from: &Arc<Neighbour>, response: RouteResponse) {
        // The response's source is the original request's target.
        let responder = response.source.address();
        let requester = response.destination.address();

        let (fulfilled, relays) = {
            let mut state = self.state();
            let matched = state.pending_requests.get(&responder).is_some_and(|slots| {
                slots
                    .iter()
                    .any(|slot| slot.request.public_key == response.requester_key)
            });
            if !matched {
                tracing::debug!(
                    %responder,
                    "dropping route response matching no outstanding request"
                );
                return;
            }

            let fulfilled = state.pending_requests.remove(&responder).unwrap_or_default();

            // Both directions run through the response's ingress
            // neighbour; when this node is the requester itself, its own
            // side terminates at the loopback pseudo-neighbour.
            let towards_requester = if requester == self.inner.local.address() {
                self.inner.self_neighbour.clone()
            } else {
                from.clone()
            };
            state.routes.insert(
                (requester, responder),
                RouteEntry {
                    towards_source: towards_requester.clone(),
                    towards_destination: from.clone(),
                },
            );
            state.routes.insert(
                (responder, requester),
                RouteEntry {
                    towards_source: from.clone(),
                    towards_destination: towards_requester,
                },
            );
            state
                .directions
                .entry(responder)
                .or_insert_with(|| from.clone());

            let relays: Vec<_> = state
                .neighbours
                .values()
                .filter(|neighbour| neighbour.address() != from.address())
                .cloned()
                .collect();
            (fulfilled, relays)
        };

        tracing::debug!(
            %responder,
            %requester,
            via = %from.address(),
            pending = fulfilled.len(),
            "route installed"
        );
        for slot in fulfilled {
            let _ = slot.reply.send((from.clone(), response.clone()));
        }
        // Relay to the neighbours still awaiting the response from the
        // earlier flood.
        let message = Message::Response(response);
        for neighbour in relays {
            neighbour.send(&message);
        }
    }

    fn handle_error(&self, from: &Arc<Neighbour>, error: RouteError) {
        let pair = (
            error.route_source.address(),
            error.route_destination.address(),
        );
        let towards_source = {
            let mut state = self.state();
            let Some(entry) = state.routes.get(&pair) else {
                return;
            };
            // Only the far-side neighbour may invalidate a route.
            if entry.towards_destination.address() != from.address() {
                tracing::debug!(
                    from = %from.address(),
                    source = %pair.0,
                    destination = %pair.1,
                    "ignoring route error from off-route neighbour"
                );
                return;
            }
            let towards_source = entry.towards_source.clone();
            state.routes.remove(&pair);
            state.routes.remove(&(pair.1, pair.0));
            if state
                .directions
                .get(&pair.1)
                .is_some_and(|via| via.address() == from.address())
            {
                state.directions.remove(&pair.1);
            }
            towards_source
        };
        tracing::debug!(
            source = %pair.0,
            destination = %pair.1,
            "route invalidated"
        );
        towards_source.send(&Message::Error(error));
    }

    /// Schedule the TTL expiry for a pending request slot.
    fn arm_request_ttl(&self, destination: NodeAddress, id: u64) {
        let forwarder = self.clone();
        let ttl = self.inner.config.rreq_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            forwarder.remove_request(destination, id);
        });
    }

    /// Remove a pending request slot. Idempotent; dropping the slot
    /// resolves any awaiter with a timeout.
    fn remove_request(&self, destination: NodeAddress, id: u64) {
        let mut state = self.state();
        let Some(slots) = state.pending_requests.get_mut(&destination) else {
            return;
        };
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            state.pending_requests.remove(&destination);
        }
        drop(state);
        if removed {
            tracing::debug!(%destination, "route request expired");
        }
    }

    fn state(&self) -> MutexGuard<'_, ForwarderState> {
        self.inner
            .state
            .lock()
            .expect("forwarder state lock poisoned")
    }
}
