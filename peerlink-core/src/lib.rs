//! Peerlink Core - peer connection layer for a distributed ledger node
//!
//! This crate maintains one persistent, reconnecting transport connection
//! per remote peer, multiplexes concurrent request/response exchanges over
//! it, and tracks per-peer availability for higher-level peer selection.
//! Each peer is served by an independent connection actor; byte-level
//! socket handling and payload semantics stay below and above this crate
//! respectively.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod tracing_setup;
pub mod transport;

// Re-export main types for convenient access
pub use config::PeerlinkConfig;
pub use connection::{
    ConnectionError, ConnectionHandle, ConnectionState, ConnectionStats, PeerId, spawn_connection,
};
pub use protocol::{BinaryCodec, Codec, DecodeError, Envelope};
pub use registry::ConnectionRegistry;
pub use transport::{Link, LinkEvent, SimTransport, TcpTransport, Transport, TransportError};

/// Convenient result alias for connection operations.
pub type Result<T> = std::result::Result<T, ConnectionError>;
