//! TCP transport with length-prefixed framing

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{Link, LinkEvent, Transport, TransportError};
use crate::config::TransportConfig;

/// Production transport over TCP.
///
/// Each frame is preceded by a 4-byte big-endian length. An established
/// link is serviced by two detached tasks: a reader pushing inbound
/// frames as [`LinkEvent`]s and a writer draining a bounded outbound
/// queue. Either task reports failure as [`LinkEvent::Closed`].
pub struct TcpTransport {
    config: TransportConfig,
}

impl TcpTransport {
    /// Creates a TCP transport with the given settings.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        address: SocketAddr,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Box<dyn Link>, TransportError> {
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::Connect {
                    address,
                    reason: e.to_string(),
                });
            }
            Err(_) => return Err(TransportError::ConnectTimeout { address }),
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(address = %address, error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue);

        tokio::spawn(run_reader(
            read_half,
            events.clone(),
            self.config.max_frame_size,
        ));
        tokio::spawn(run_writer(write_half, outbound_rx, events));

        Ok(Box::new(TcpLink {
            outbound: outbound_tx,
            max_frame_size: self.config.max_frame_size,
        }))
    }
}

/// Outbound handle to an established TCP link.
struct TcpLink {
    outbound: mpsc::Sender<Bytes>,
    max_frame_size: usize,
}

impl Link for TcpLink {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if frame.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }

        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::LinkClosed,
        })
    }
}

/// Reads length-prefixed frames until EOF or error.
async fn run_reader(
    mut read_half: OwnedReadHalf,
    events: mpsc::Sender<LinkEvent>,
    max_frame_size: usize,
) {
    let reason = loop {
        let mut len_buf = [0u8; 4];
        if let Err(e) = read_half.read_exact(&mut len_buf).await {
            break e.to_string();
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > max_frame_size {
            break format!("inbound frame of {len} bytes exceeds maximum of {max_frame_size}");
        }

        let mut frame = vec![0u8; len];
        if let Err(e) = read_half.read_exact(&mut frame).await {
            break e.to_string();
        }

        if events.send(LinkEvent::Frame(frame.into())).await.is_err() {
            // Owner dropped the link; nothing left to deliver to
            return;
        }
    };

    let _ = events.send(LinkEvent::Closed { reason }).await;
}

/// Writes queued frames until the queue closes or a write fails.
async fn run_writer(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<LinkEvent>,
) {
    while let Some(frame) = outbound.recv().await {
        let result = async {
            write_half
                .write_all(&(frame.len() as u32).to_be_bytes())
                .await?;
            write_half.write_all(&frame).await?;
            write_half.flush().await
        }
        .await;

        if let Err(e) = result {
            let _ = events
                .send(LinkEvent::Closed {
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    }
}
