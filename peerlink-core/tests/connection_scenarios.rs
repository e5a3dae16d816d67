//! End-to-end scenarios for the connection layer.
//!
//! Drives connection actors through the scripted in-memory transport:
//! connect/reconnect behavior, request correlation, timeout accounting,
//! and teardown guarantees.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use peerlink_core::transport::simulation::ConnectScript;
use peerlink_core::{
    BinaryCodec, Codec as _, ConnectionError, ConnectionHandle, ConnectionRegistry, PeerId,
    PeerlinkConfig, SimTransport, spawn_connection,
};

fn test_address() -> SocketAddr {
    "127.0.0.1:9100".parse().unwrap()
}

fn spawn_test_connection(
    transport: Arc<SimTransport>,
) -> (ConnectionHandle, Arc<BinaryCodec>) {
    let codec = Arc::new(BinaryCodec::new(PeerId::generate()));
    let handle = spawn_connection(
        PeerId::generate(),
        test_address(),
        transport,
        codec.clone(),
        PeerlinkConfig::for_testing().connection,
    );
    (handle, codec)
}

async fn wait_connected(handle: &ConnectionHandle) {
    for _ in 0..200 {
        if handle.stats().await.unwrap().state.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("peer never connected");
}

/// Scenario: connect succeeds instantly, a request gets no reply; the
/// call resolves with `Timeout` and the backlog is empty afterward.
#[tokio::test]
async fn unanswered_request_times_out_and_clears_the_backlog() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, _codec) = spawn_test_connection(transport.clone());
    let _remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let result = handle
        .send_message(Bytes::from_static(b"get_block 1"), Duration::from_millis(100))
        .await;

    assert!(matches!(
        result,
        Err(ConnectionError::Timeout { request_id: 0 })
    ));
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.outstanding_requests, 0);
    assert_eq!(stats.timeouts, 1);
}

/// Scenario: a correctly-correlated reply arrives before the deadline;
/// the caller receives it and the backlog empties.
#[tokio::test]
async fn correlated_reply_resolves_the_caller() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, codec) = spawn_test_connection(transport.clone());
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let responder = tokio::spawn({
        let codec = codec.clone();
        async move {
            let frame = remote.recv_frame().await.unwrap();
            let envelope = codec.decode(&frame).unwrap();
            assert_eq!(envelope.payload.as_ref(), b"get_tip");
            remote
                .deliver(codec.encode(envelope.request_id, b"tip: 42"))
                .await;
        }
    });

    let reply = handle
        .send_message(Bytes::from_static(b"get_tip"), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply.as_ref(), b"tip: 42");
    responder.await.unwrap();

    assert_eq!(handle.stats().await.unwrap().outstanding_requests, 0);
}

/// Scenario: connect fails immediately; a send resolves with `Closed`
/// well within the request timeout.
#[tokio::test]
async fn send_while_disconnected_fails_fast() {
    let (transport, _accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    transport.script([ConnectScript::Refuse, ConnectScript::Hang]).await;
    let (handle, _codec) = spawn_test_connection(transport.clone());

    let started = Instant::now();
    let result = handle
        .send_message(Bytes::from_static(b"ping"), Duration::from_secs(100))
        .await;

    assert!(matches!(result, Err(ConnectionError::Closed)));
    assert!(started.elapsed() < Duration::from_millis(100));
}

/// Scenario: timeout-driven downtime is reported once with reset, then
/// gone; a connected peer always reports zero.
#[tokio::test]
async fn availability_accrues_on_timeout_and_resets_once() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, _codec) = spawn_test_connection(transport.clone());
    let remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    // An unanswered request accrues its full wait, rounded to seconds
    let result = handle
        .send_message(Bytes::from_static(b"ping"), Duration::from_millis(700))
        .await;
    assert!(matches!(result, Err(ConnectionError::Timeout { .. })));

    // Availability is only reported while disconnected; refusals hold
    // the redial loop off long enough to observe it
    transport.script([ConnectScript::Refuse; 20]).await;
    remote.close("test").await;
    for _ in 0..200 {
        if !handle.stats().await.unwrap().state.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(handle.get_availability(true).await.unwrap(), 1);
    assert_eq!(handle.get_availability(false).await.unwrap(), 0);

    // Reconnected peers report zero regardless of reset
    let _redialed = accepted.recv().await.unwrap();
    wait_connected(&handle).await;
    assert_eq!(handle.get_availability(true).await.unwrap(), 0);
}

/// Scenario: the transport signals closure; every outstanding request
/// resolves with `Closed` and the actor reconnects on its own.
#[tokio::test]
async fn closure_fails_outstanding_requests_and_reconnects() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, _codec) = spawn_test_connection(transport.clone());
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let handle = handle.clone();
        waiters.push(tokio::spawn(async move {
            handle
                .send_message(Bytes::from_static(b"ping"), Duration::from_secs(30))
                .await
        }));
    }
    // All three must be on the wire before the link drops
    for _ in 0..3 {
        remote.recv_frame().await.unwrap();
    }

    remote.close("remote went away").await;

    let started = Instant::now();
    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Closed)));
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    // The reconnection loop dials again without outside help
    let _redialed = accepted.recv().await.unwrap();
    wait_connected(&handle).await;
}

/// Replies are matched purely by request id: out-of-order replies
/// resolve exactly the callers that issued them.
#[tokio::test]
async fn out_of_order_replies_resolve_their_own_callers() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, codec) = spawn_test_connection(transport.clone());
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let first = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .send_message(Bytes::from_static(b"first"), Duration::from_secs(5))
                .await
        }
    });
    let second = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .send_message(Bytes::from_static(b"second"), Duration::from_secs(5))
                .await
        }
    });

    let mut envelopes = Vec::new();
    for _ in 0..2 {
        let frame = remote.recv_frame().await.unwrap();
        envelopes.push(codec.decode(&frame).unwrap());
    }

    // Answer in reverse submission order, echoing each request payload
    for envelope in envelopes.iter().rev() {
        let mut reply = b"re:".to_vec();
        reply.extend_from_slice(&envelope.payload);
        remote.deliver(codec.encode(envelope.request_id, &reply)).await;
    }

    assert_eq!(first.await.unwrap().unwrap().as_ref(), b"re:first");
    assert_eq!(second.await.unwrap().unwrap().as_ref(), b"re:second");
}

/// A reply that lost its race against the deadline is dropped silently
/// and can never complete a second caller.
#[tokio::test]
async fn late_reply_is_a_no_op() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, codec) = spawn_test_connection(transport.clone());
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let result = handle
        .send_message(Bytes::from_static(b"slow"), Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(ConnectionError::Timeout { .. })));

    // Deliver the reply for the already-expired request, twice
    let frame = remote.recv_frame().await.unwrap();
    let expired = codec.decode(&frame).unwrap();
    remote
        .deliver(codec.encode(expired.request_id, b"too late"))
        .await;
    remote
        .deliver(codec.encode(expired.request_id, b"too late"))
        .await;

    // The actor is still healthy and a fresh request works
    let responder = tokio::spawn({
        let codec = codec.clone();
        async move {
            let frame = remote.recv_frame().await.unwrap();
            let envelope = codec.decode(&frame).unwrap();
            remote.deliver(codec.encode(envelope.request_id, b"fresh")).await;
        }
    });

    let reply = handle
        .send_message(Bytes::from_static(b"again"), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply.as_ref(), b"fresh");
    responder.await.unwrap();
}

/// A transmit failure surfaces the transport error to its caller,
/// flips the state to disconnected, and triggers a redial.
#[tokio::test]
async fn transmit_failure_disconnects_and_redials() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, _codec) = spawn_test_connection(transport.clone());
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    // Refusals keep the redial loop from reconnecting under the assertions
    transport.script([ConnectScript::Refuse; 20]).await;
    remote.sever();
    let result = handle
        .send_message(Bytes::from_static(b"ping"), Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(ConnectionError::Transport(_))));

    let stats = handle.stats().await.unwrap();
    assert!(!stats.state.is_connected());
    assert_eq!(stats.outstanding_requests, 0);

    // Transmit failures do not accrue downtime
    assert_eq!(handle.get_availability(false).await.unwrap(), 0);

    let _redialed = accepted.recv().await.unwrap();
    wait_connected(&handle).await;
}

/// Undecodable inbound frames are dropped without failing any request.
#[tokio::test]
async fn malformed_frames_do_not_affect_liveness() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, codec) = spawn_test_connection(transport.clone());
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    remote.deliver(Bytes::from_static(b"junk")).await;

    let responder = tokio::spawn({
        let codec = codec.clone();
        async move {
            let frame = remote.recv_frame().await.unwrap();
            let envelope = codec.decode(&frame).unwrap();
            remote.deliver(codec.encode(envelope.request_id, b"ok")).await;
        }
    });

    let reply = handle
        .send_message(Bytes::from_static(b"ping"), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply.as_ref(), b"ok");
    responder.await.unwrap();
}

/// Teardown resolves every outstanding waiter with a definitive error.
#[tokio::test]
async fn shutdown_fails_outstanding_requests() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, _codec) = spawn_test_connection(transport.clone());
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let waiter = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .send_message(Bytes::from_static(b"ping"), Duration::from_secs(30))
                .await
        }
    });
    remote.recv_frame().await.unwrap();

    handle.shutdown().await.unwrap();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(ConnectionError::Shutdown)));
}

/// The registry resolves peers end to end: start, exchange, stop.
#[tokio::test]
async fn registry_routes_requests_by_peer_identity() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let node_id = PeerId::generate();
    let codec = Arc::new(BinaryCodec::new(node_id));
    let registry = ConnectionRegistry::new(codec.clone(), PeerlinkConfig::for_testing());

    let peer_id = PeerId::generate();
    let handle = registry
        .start(peer_id, test_address(), transport.clone())
        .await
        .unwrap();
    let mut remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let responder = tokio::spawn({
        let codec = codec.clone();
        async move {
            let frame = remote.recv_frame().await.unwrap();
            let envelope = codec.decode(&frame).unwrap();
            // Outgoing envelopes carry the local node identity
            assert_eq!(envelope.sender, node_id);
            remote.deliver(codec.encode(envelope.request_id, b"ack")).await;
        }
    });

    let reply = registry
        .send_message(peer_id, Bytes::from_static(b"hello"), None)
        .await
        .unwrap();
    assert_eq!(reply.as_ref(), b"ack");
    responder.await.unwrap();

    registry.stop(peer_id).await.unwrap();
    assert!(registry.is_empty().await);
}

/// Events from a dead link cannot leak into its successor: after a
/// reconnect the actor only honors frames from the new link.
#[tokio::test]
async fn stale_link_frames_do_not_reach_the_actor() {
    let (transport, mut accepted) = SimTransport::new();
    let transport = Arc::new(transport);
    let (handle, codec) = spawn_test_connection(transport.clone());
    let old_remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    old_remote.close("flap").await;
    let mut new_remote = accepted.recv().await.unwrap();
    wait_connected(&handle).await;

    let responder = tokio::spawn({
        let codec = codec.clone();
        async move {
            let frame = new_remote.recv_frame().await.unwrap();
            let envelope = codec.decode(&frame).unwrap();
            // A stale frame for the same id from the old link is inert
            old_remote
                .deliver(codec.encode(envelope.request_id, b"stale"))
                .await;
            new_remote
                .deliver(codec.encode(envelope.request_id, b"live"))
                .await;
        }
    });

    let reply = handle
        .send_message(Bytes::from_static(b"ping"), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply.as_ref(), b"live");
    responder.await.unwrap();
}
