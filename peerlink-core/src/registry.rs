//! Registry mapping peer identities to connection actors.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::config::PeerlinkConfig;
use crate::connection::{
    ConnectionError, ConnectionHandle, ConnectionStats, PeerId, spawn_connection,
};
use crate::protocol::Codec;
use crate::transport::Transport;

/// Routes callers to per-peer connection actors.
///
/// Thin concurrent map from peer identity to [`ConnectionHandle`]:
/// insertion on peer creation, removal on teardown, lookup from any
/// task. The actors it indexes run independently; the registry never
/// holds its lock across a peer operation.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<PeerId, ConnectionHandle>>,
    codec: Arc<dyn Codec>,
    config: PeerlinkConfig,
}

impl ConnectionRegistry {
    /// Creates an empty registry whose actors share `codec` and `config`.
    pub fn new(codec: Arc<dyn Codec>, config: PeerlinkConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            codec,
            config,
        }
    }

    /// Starts a connection actor for `peer_id` dialing `address`.
    ///
    /// Returns without waiting for connectivity; the actor connects in
    /// the background. A dead handle left under the same id is replaced.
    ///
    /// # Errors
    /// - `ConnectionError::DuplicatePeer` - Peer already has a live actor
    pub async fn start(
        &self,
        peer_id: PeerId,
        address: SocketAddr,
        transport: Arc<dyn Transport>,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.get(&peer_id) {
            if existing.is_running() {
                return Err(ConnectionError::DuplicatePeer { peer_id });
            }
        }

        let handle = spawn_connection(
            peer_id,
            address,
            transport,
            Arc::clone(&self.codec),
            self.config.connection.clone(),
        );
        connections.insert(peer_id, handle.clone());
        Ok(handle)
    }

    /// Sends a request to `peer_id` and waits for the correlated reply.
    ///
    /// Uses the configured default request timeout when none is given.
    ///
    /// # Errors
    /// - `ConnectionError::PeerNotFound` - No actor registered for `peer_id`
    /// - `ConnectionError::Closed` - Peer not connected
    /// - `ConnectionError::Timeout` - No reply before the deadline
    /// - `ConnectionError::Transport` - Transmit failed
    /// - `ConnectionError::Shutdown` - Actor no longer running
    pub async fn send_message(
        &self,
        peer_id: PeerId,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Bytes, ConnectionError> {
        let handle = self
            .handle(peer_id)
            .await
            .ok_or(ConnectionError::PeerNotFound { peer_id })?;
        let timeout = timeout.unwrap_or(self.config.connection.default_request_timeout);
        handle.send_message(payload, timeout).await
    }

    /// Reports `peer_id`'s accumulated unavailable time in whole seconds.
    ///
    /// # Errors
    /// - `ConnectionError::PeerNotFound` - No actor registered for `peer_id`
    /// - `ConnectionError::Shutdown` - Actor no longer running
    pub async fn get_availability(
        &self,
        peer_id: PeerId,
        reset: bool,
    ) -> Result<u64, ConnectionError> {
        let handle = self
            .handle(peer_id)
            .await
            .ok_or(ConnectionError::PeerNotFound { peer_id })?;
        handle.get_availability(reset).await
    }

    /// Snapshot of `peer_id`'s connection state and counters.
    ///
    /// # Errors
    /// - `ConnectionError::PeerNotFound` - No actor registered for `peer_id`
    /// - `ConnectionError::Shutdown` - Actor no longer running
    pub async fn stats(&self, peer_id: PeerId) -> Result<ConnectionStats, ConnectionError> {
        let handle = self
            .handle(peer_id)
            .await
            .ok_or(ConnectionError::PeerNotFound { peer_id })?;
        handle.stats().await
    }

    /// Stops `peer_id`'s actor and removes it from the registry.
    ///
    /// # Errors
    /// - `ConnectionError::PeerNotFound` - No actor registered for `peer_id`
    pub async fn stop(&self, peer_id: PeerId) -> Result<(), ConnectionError> {
        let handle = self
            .connections
            .write()
            .await
            .remove(&peer_id)
            .ok_or(ConnectionError::PeerNotFound { peer_id })?;

        // An actor that already stopped on its own still counts as stopped
        let _ = handle.shutdown().await;
        Ok(())
    }

    /// Stops every registered actor; used on node shutdown.
    pub async fn stop_all(&self) {
        let handles: Vec<ConnectionHandle> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }

    /// Handle for `peer_id`, if registered.
    pub async fn handle(&self, peer_id: PeerId) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&peer_id).cloned()
    }

    /// Identities of all registered peers.
    pub async fn peer_ids(&self) -> Vec<PeerId> {
        self.connections.read().await.keys().copied().collect()
    }

    /// Number of registered peers.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
