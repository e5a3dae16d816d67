//! Scripted in-memory transport for tests

use std::collections::VecDeque;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

use super::{Link, LinkEvent, Transport, TransportError};

/// Outcome script for a single connect attempt.
#[derive(Debug, Clone, Copy)]
pub enum ConnectScript {
    /// The attempt succeeds.
    Accept,
    /// The attempt fails immediately.
    Refuse,
    /// The attempt never completes.
    Hang,
}

/// In-memory transport with scripted connect outcomes.
///
/// Connect attempts consume queued scripts front-to-back; once the queue
/// is empty every attempt is accepted. Each accepted attempt hands the
/// test a [`SimRemote`] through which it can observe outbound frames,
/// inject replies, and close the link.
pub struct SimTransport {
    scripts: Mutex<VecDeque<ConnectScript>>,
    remotes: mpsc::UnboundedSender<SimRemote>,
}

impl SimTransport {
    /// Creates a transport plus the stream of remote ends of accepted links.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SimRemote>) {
        let (remotes, accepted) = mpsc::unbounded_channel();
        let transport = Self {
            scripts: Mutex::new(VecDeque::new()),
            remotes,
        };
        (transport, accepted)
    }

    /// Queues connect outcomes, consumed in order by `connect`.
    pub async fn script(&self, outcomes: impl IntoIterator<Item = ConnectScript>) {
        self.scripts.lock().await.extend(outcomes);
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn connect(
        &self,
        address: SocketAddr,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Box<dyn Link>, TransportError> {
        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or(ConnectScript::Accept);

        match script {
            ConnectScript::Refuse => Err(TransportError::Connect {
                address,
                reason: "refused by script".to_string(),
            }),
            ConnectScript::Hang => std::future::pending().await,
            ConnectScript::Accept => {
                let (frames_tx, frames_rx) = mpsc::unbounded_channel();
                let remote = SimRemote {
                    address,
                    frames: frames_rx,
                    events,
                };
                let _ = self.remotes.send(remote);
                Ok(Box::new(SimLink { frames: frames_tx }))
            }
        }
    }
}

/// Test-side end of an accepted simulated link.
pub struct SimRemote {
    address: SocketAddr,
    frames: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::Sender<LinkEvent>,
}

impl SimRemote {
    /// Address the actor dialed.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Next frame the actor transmitted, or `None` once the link is gone.
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Delivers an inbound frame to the actor.
    pub async fn deliver(&self, frame: Bytes) {
        let _ = self.events.send(LinkEvent::Frame(frame)).await;
    }

    /// Signals closure to the actor.
    pub async fn close(&self, reason: &str) {
        let _ = self
            .events
            .send(LinkEvent::Closed {
                reason: reason.to_string(),
            })
            .await;
    }

    /// Stops accepting outbound frames so the actor's next send fails.
    pub fn sever(&mut self) {
        self.frames.close();
    }
}

/// Outbound handle to a simulated link.
struct SimLink {
    frames: mpsc::UnboundedSender<Bytes>,
}

impl Link for SimLink {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.frames.send(frame).map_err(|_| TransportError::LinkClosed)
    }
}
