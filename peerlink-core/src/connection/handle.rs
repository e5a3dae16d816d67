//! Handle for communicating with a connection actor.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::commands::{ConnectionCommand, ConnectionStats};
use super::{ConnectionError, PeerId};

/// Handle for communicating with a peer's connection actor.
///
/// Cloneable and shareable across tasks. Every operation suspends only
/// on its own private response channel, never on the actor's internal
/// work, so unrelated callers cannot block each other.
#[derive(Clone)]
pub struct ConnectionHandle {
    peer_id: PeerId,
    sender: mpsc::Sender<ConnectionCommand>,
}

impl ConnectionHandle {
    pub(crate) fn new(peer_id: PeerId, sender: mpsc::Sender<ConnectionCommand>) -> Self {
        Self { peer_id, sender }
    }

    /// Identity of the peer this handle addresses.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Sends a request and waits for the correlated reply.
    ///
    /// While the peer is not connected this resolves immediately with
    /// [`ConnectionError::Closed`]; the latency of that path does not
    /// depend on `timeout` or on any connect attempt in flight.
    ///
    /// # Errors
    /// - `ConnectionError::Closed` - Peer not connected
    /// - `ConnectionError::Timeout` - No reply before the deadline
    /// - `ConnectionError::Transport` - Transmit failed
    /// - `ConnectionError::Shutdown` - Actor no longer running
    pub async fn send_message(
        &self,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, ConnectionError> {
        let (responder, rx) = oneshot::channel();
        let cmd = ConnectionCommand::SendMessage {
            payload,
            timeout,
            responder,
        };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| ConnectionError::Shutdown)?;

        rx.await.map_err(|_| ConnectionError::Shutdown)?
    }

    /// Reports accumulated unavailable time in whole seconds.
    ///
    /// While disconnected, `reset` zeroes the accumulator after reading
    /// it. A connected peer reports zero and is never mutated.
    ///
    /// # Errors
    /// - `ConnectionError::Shutdown` - Actor no longer running
    pub async fn get_availability(&self, reset: bool) -> Result<u64, ConnectionError> {
        let (responder, rx) = oneshot::channel();
        let cmd = ConnectionCommand::GetAvailability { reset, responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| ConnectionError::Shutdown)?;

        rx.await.map_err(|_| ConnectionError::Shutdown)
    }

    /// Snapshot of the connection's state and counters.
    ///
    /// # Errors
    /// - `ConnectionError::Shutdown` - Actor no longer running
    pub async fn stats(&self) -> Result<ConnectionStats, ConnectionError> {
        let (responder, rx) = oneshot::channel();
        let cmd = ConnectionCommand::GetStats { responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| ConnectionError::Shutdown)?;

        rx.await.map_err(|_| ConnectionError::Shutdown)
    }

    /// Points subsequent connect attempts at a new address.
    ///
    /// The live link, if any, is unaffected; the new address is used
    /// from the next dial onward.
    ///
    /// # Errors
    /// - `ConnectionError::Shutdown` - Actor no longer running
    pub async fn set_address(&self, address: SocketAddr) -> Result<(), ConnectionError> {
        let (responder, rx) = oneshot::channel();
        let cmd = ConnectionCommand::SetAddress { address, responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| ConnectionError::Shutdown)?;

        rx.await.map_err(|_| ConnectionError::Shutdown)
    }

    /// Shuts down the actor, failing all outstanding requests.
    ///
    /// # Errors
    /// - `ConnectionError::Shutdown` - Actor already gone
    pub async fn shutdown(&self) -> Result<(), ConnectionError> {
        let (responder, rx) = oneshot::channel();
        let cmd = ConnectionCommand::Shutdown { responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| ConnectionError::Shutdown)?;

        rx.await.map_err(|_| ConnectionError::Shutdown)
    }

    /// Whether the actor is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
