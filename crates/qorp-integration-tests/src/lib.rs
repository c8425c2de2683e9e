//! Shared helpers for QORP integration tests.
//!
//! Routers are wired together with in-memory bidirectional links: frames
//! enqueued on a neighbour's connection are pumped into the peer's
//! forwarder by a background task, preserving per-link ordering the way a
//! stream transport would.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use qorp_router::config::RouterConfig;
use qorp_router::forwarder::MessageForwarder;
use qorp_router::frontend::{Frontend, FrontendData};
use qorp_router::neighbour::{Connection, Neighbour};
use qorp_router::router::Router;

/// A frontend that records every delivered payload.
#[derive(Default)]
pub struct RecordingFrontend {
    received: Mutex<Vec<FrontendData>>,
}

impl RecordingFrontend {
    /// Snapshot of everything delivered so far.
    pub fn received(&self) -> Vec<FrontendData> {
        self.received.lock().expect("frontend lock").clone()
    }
}

impl Frontend for RecordingFrontend {
    fn message_callback(&self, message: FrontendData) {
        self.received.lock().expect("frontend lock").push(message);
    }
}

/// Create a router with a recording frontend and the given config.
pub fn test_router_with(config: RouterConfig) -> (Arc<Router>, Arc<RecordingFrontend>) {
    let frontend = Arc::new(RecordingFrontend::default());
    let router = Router::generate(frontend.clone(), config);
    (router, frontend)
}

/// Create a router with a recording frontend and default config.
pub fn test_router() -> (Arc<Router>, Arc<RecordingFrontend>) {
    test_router_with(RouterConfig::default())
}

/// Wire two routers together with an in-memory bidirectional link.
pub fn link(a: &Arc<Router>, b: &Arc<Router>) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
    let b_at_a = Arc::new(Neighbour::remote(
        b.local_node().clone(),
        vec![Connection::new(a_to_b_tx)],
    ));
    let a_at_b = Arc::new(Neighbour::remote(
        a.local_node().clone(),
        vec![Connection::new(b_to_a_tx)],
    ));
    a.add_neighbour(b_at_a.clone());
    b.add_neighbour(a_at_b.clone());
    pump(b.forwarder().clone(), a_at_b, a_to_b_rx);
    pump(a.forwarder().clone(), b_at_a, b_to_a_rx);
}

/// Deliver frames from one side of a link into a forwarder.
fn pump(
    forwarder: MessageForwarder,
    ingress: Arc<Neighbour>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            forwarder.ingest_frame(&ingress, &frame);
        }
    });
}

/// Poll a condition for up to a second before failing the test.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(condition(), "timed out waiting for: {what}");
}
