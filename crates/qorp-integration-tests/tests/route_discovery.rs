//! Integration test: on-demand route discovery across live nodes.
//!
//! Exercises the full stack (codec, admission, forwarder dispatch,
//! pending-request coalescing, X25519 key agreement) over in-memory
//! links between complete router instances.

use std::time::Duration;

use qorp_crypto::ed25519::KeyPair;
use qorp_proto::nodes::{KnownNode, Node};
use qorp_router::config::RouterConfig;
use qorp_router::RouterError;

use qorp_integration_tests::{link, test_router, test_router_with, wait_until};

#[tokio::test]
async fn adjacent_nodes_agree_on_session() {
    let (alpha, _) = test_router();
    let (beta, _) = test_router();
    link(&alpha, &beta);

    let direction = alpha
        .forwarder()
        .find_direction(&Node::Known(beta.local_node().clone()), Some(Duration::from_secs(5)))
        .await
        .expect("route to adjacent node");

    assert_eq!(direction.address(), beta.address());
    assert!(alpha.has_session(&beta.address()));
    assert!(beta.has_session(&alpha.address()));
}

#[tokio::test]
async fn discovery_works_with_opaque_destination() {
    let (alpha, _) = test_router();
    let (beta, _) = test_router();
    link(&alpha, &beta);

    // Alpha only knows beta's 32-byte address, not its key.
    let direction = alpha
        .forwarder()
        .find_direction(&Node::Opaque(beta.address()), Some(Duration::from_secs(5)))
        .await
        .expect("route by bare address");

    assert_eq!(direction.address(), beta.address());
    assert!(alpha.has_session(&beta.address()));
}

#[tokio::test]
async fn relayed_discovery_installs_route_at_relay() {
    let (alpha, _) = test_router();
    let (relay, _) = test_router();
    let (gamma, _) = test_router();
    link(&alpha, &relay);
    link(&relay, &gamma);

    let direction = alpha
        .forwarder()
        .find_direction(&Node::Known(gamma.local_node().clone()), Some(Duration::from_secs(5)))
        .await
        .expect("route through the relay");

    assert_eq!(direction.address(), relay.address());
    assert!(alpha.has_session(&gamma.address()));
    assert!(gamma.has_session(&alpha.address()));

    // The relay observed the response and installed both directions.
    wait_until("relay installs the route pair", || {
        relay
            .forwarder()
            .route(&alpha.address(), &gamma.address())
            .is_some()
            && relay
                .forwarder()
                .route(&gamma.address(), &alpha.address())
                .is_some()
    })
    .await;
    assert!(
        !relay.forwarder().has_pending_request(&gamma.address()),
        "fulfilment must clear the relay's pending table"
    );
}

#[tokio::test]
async fn unreachable_target_times_out_everywhere() {
    let config = RouterConfig {
        rreq_timeout_ms: 100,
    };
    let (alpha, _) = test_router_with(config.clone());
    let (beta, _) = test_router_with(config);
    link(&alpha, &beta);

    let stranger = KnownNode::new(KeyPair::generate().verifying_key());
    let outcome = alpha
        .forwarder()
        .find_direction(&Node::Known(stranger.clone()), None)
        .await;
    assert!(matches!(outcome, Err(RouterError::RouteRequestTimeout)));
    assert!(!alpha.forwarder().has_pending_request(&stranger.address()));

    // Beta relayed the flood and parked its own slot; it must expire too.
    wait_until("beta's pending slot expires", || {
        !beta.forwarder().has_pending_request(&stranger.address())
    })
    .await;
}
