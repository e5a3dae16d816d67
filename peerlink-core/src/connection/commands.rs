//! Command definitions for the connection actor model.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use super::{ConnectionError, ConnectionState, PeerId};

/// Commands that can be sent to a connection actor.
///
/// Each command carries a response channel the actor resolves once the
/// operation settles. A request/response exchange keeps its responder in
/// the outstanding-request backlog until a correlated reply, a timeout,
/// or a transmit failure settles it; every other command is answered
/// inline by the actor loop.
pub enum ConnectionCommand {
    /// Send a request and wait for the correlated reply.
    SendMessage {
        payload: Bytes,
        timeout: Duration,
        responder: oneshot::Sender<Result<Bytes, ConnectionError>>,
    },
    /// Report accumulated unavailable time, optionally resetting it.
    GetAvailability {
        reset: bool,
        responder: oneshot::Sender<u64>,
    },
    /// Snapshot the connection's state and counters.
    GetStats {
        responder: oneshot::Sender<ConnectionStats>,
    },
    /// Point subsequent connect attempts at a new address.
    SetAddress {
        address: SocketAddr,
        responder: oneshot::Sender<()>,
    },
    /// Shut down the actor, failing all outstanding requests.
    Shutdown { responder: oneshot::Sender<()> },
}

/// Point-in-time view of a single peer connection.
///
/// Produced by the actor on request; all fields are snapshots and go
/// stale immediately.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    /// Peer identity the actor serves
    pub peer_id: PeerId,
    /// Address used by the most recent connect attempt
    pub address: SocketAddr,
    /// Externally observable connection state
    pub state: ConnectionState,
    /// Time since connectivity was last established, while the
    /// availability clock is running
    pub connected_for: Option<Duration>,
    /// Requests currently awaiting a reply
    pub outstanding_requests: usize,
    /// Requests accepted for transmission since startup
    pub requests_sent: u64,
    /// Correlated replies delivered to callers
    pub replies_received: u64,
    /// Requests that expired before a reply arrived
    pub timeouts: u64,
    /// Connect attempts dispatched by the reconnection loop
    pub connect_attempts: u64,
}
