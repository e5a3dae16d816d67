//! Transport capability boundary below the connection actors
//!
//! Connection actors never touch sockets. They dial through [`Transport`],
//! push outbound frames through [`Link`], and receive inbound frames and
//! closure notifications as [`LinkEvent`]s on a channel they own.

pub mod simulation;
pub mod tcp;

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub use simulation::{ConnectScript, SimRemote, SimTransport};
pub use tcp::TcpTransport;

/// Events pushed asynchronously by an established link to its owner.
#[derive(Debug)]
pub enum LinkEvent {
    /// A complete inbound frame.
    Frame(Bytes),
    /// The link was closed by the remote side or failed.
    Closed { reason: String },
}

/// Connection-establishment capability.
///
/// Implementations own all socket handling below this boundary,
/// including encryption and authentication. Inbound frames and the
/// eventual closure notification are delivered through the `events`
/// channel handed to [`Transport::connect`]; outbound frames go through
/// the returned [`Link`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes a link to `address`.
    ///
    /// May take arbitrarily long; connection actors always call this from
    /// a detached task, never from their command-processing path. The
    /// next attempt is dispatched only after the current one resolves,
    /// so implementations must eventually settle every dial (the TCP
    /// transport bounds dials with its configured connect timeout).
    ///
    /// # Errors
    /// - `TransportError::Connect` - The dial failed or was refused
    /// - `TransportError::ConnectTimeout` - Implementation-level dial timeout
    async fn connect(
        &self,
        address: SocketAddr,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Box<dyn Link>, TransportError>;
}

/// Outbound half of an established link.
///
/// `send` must not block on I/O: implementations enqueue the frame for a
/// background writer and report only failures that are already known
/// (dead link, full outbound queue). Write failures discovered later
/// surface as [`LinkEvent::Closed`].
pub trait Link: Send + Sync {
    /// Queues one frame for transmission.
    ///
    /// # Errors
    /// - `TransportError::LinkClosed` - The writer is gone
    /// - `TransportError::Backpressure` - The outbound queue is full
    /// - `TransportError::FrameTooLarge` - Frame exceeds the configured maximum
    fn send(&self, frame: Bytes) -> Result<(), TransportError>;
}

/// Errors from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: SocketAddr, reason: String },

    #[error("connect to {address} timed out")]
    ConnectTimeout { address: SocketAddr },

    #[error("link is closed")]
    LinkClosed,

    #[error("outbound queue is full")]
    Backpressure,

    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
