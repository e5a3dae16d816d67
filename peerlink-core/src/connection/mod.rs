//! Per-peer connection actors with request correlation and reconnection

pub mod actor;
pub mod commands;
pub mod handle;

mod availability;
mod backlog;
mod core;

use std::fmt;

pub use actor::spawn_connection;
pub use commands::{ConnectionCommand, ConnectionStats};
pub use handle::ConnectionHandle;

use crate::transport::TransportError;

/// Stable peer identity.
///
/// 32-byte public key identifying a peer independently of its network
/// address. Addresses may change across reconnections; the identity
/// does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Length of a peer identity in bytes.
    pub const LEN: usize = 32;

    /// Creates a peer id from a 32-byte public key.
    pub fn new(key: [u8; 32]) -> Self {
        Self(key)
    }

    /// Returns the underlying public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Generates a random peer id.
    ///
    /// Stand-in for a real node keypair; used by tests and examples.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        for byte in &mut key {
            *byte = rand::random();
        }
        Self(key)
    }

    /// Parses a peer id from its 64-character hex form.
    ///
    /// # Errors
    /// - `hex::FromHexError` - Input is not exactly 32 hex-encoded bytes
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let raw = hex::decode(s)?;
        let key: [u8; 32] = raw
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(key))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Externally observable state of a peer connection.
///
/// A reconnect attempt may be in flight while `Disconnected`; observers
/// never see an intermediate connecting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A live transport link is established.
    Connected,
    /// No live link; the reconnection loop is running.
    Disconnected,
}

impl ConnectionState {
    /// Whether a live link is established.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Errors surfaced by connection operations.
///
/// Nothing here is fatal to the node: a failing connection degrades to
/// `Disconnected` and keeps retrying while callers decide for themselves
/// whether to retry their requests.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The peer is not connected, or the transport closed underneath an
    /// outstanding request.
    #[error("connection to peer is closed")]
    Closed,

    #[error("request {request_id} timed out")]
    Timeout { request_id: u32 },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("connection actor has shut down")]
    Shutdown,

    #[error("peer {peer_id} not found")]
    PeerNotFound { peer_id: PeerId },

    #[error("peer {peer_id} already registered")]
    DuplicatePeer { peer_id: PeerId },
}
