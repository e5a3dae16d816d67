//! Actor implementation for peer connections.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::PeerId;
use super::commands::ConnectionCommand;
use super::core::{ConnectionEvent, PeerConnection};
use super::handle::ConnectionHandle;
use crate::config::ConnectionConfig;
use crate::protocol::Codec;
use crate::transport::{LinkEvent, Transport};

/// Spawns the connection actor for one peer and returns its handle.
///
/// The actor immediately dispatches a background connect attempt;
/// creation never waits for connectivity. Commands are processed
/// sequentially by a single task, so connection state needs no locking
/// and no peer can delay another.
pub fn spawn_connection(
    peer_id: PeerId,
    address: SocketAddr,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    config: ConnectionConfig,
) -> ConnectionHandle {
    let (sender, receiver) = mpsc::channel(config.command_buffer);
    let (event_sender, event_receiver) = mpsc::unbounded_channel();
    let connection = PeerConnection::new(peer_id, address, transport, codec, config, event_sender);

    tokio::spawn(async move {
        run_actor_loop(connection, receiver, event_receiver).await;
    });

    ConnectionHandle::new(peer_id, sender)
}

/// One resolved step of the actor loop.
enum Step {
    Command(Option<ConnectionCommand>),
    Event(ConnectionEvent),
    Link(Option<LinkEvent>),
}

/// Runs the main actor processing loop.
///
/// Commands, detached-task feedback, and link events are interleaved
/// here one at a time. The loop ends on a shutdown command or once every
/// handle is gone; either way all outstanding waiters are failed and all
/// pending timers stopped before the task exits.
async fn run_actor_loop(
    mut connection: PeerConnection,
    mut receiver: mpsc::Receiver<ConnectionCommand>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    tracing::debug!(peer_id = %connection.peer_id(), "Connection actor started");
    connection.dial();

    loop {
        let step = {
            let link_events = connection.link_events_mut();
            tokio::select! {
                command = receiver.recv() => Step::Command(command),
                Some(event) = events.recv() => Step::Event(event),
                event = next_link_event(link_events) => Step::Link(event),
            }
        };

        match step {
            Step::Command(Some(command)) => {
                if !connection.handle_command(command) {
                    break;
                }
            }
            // Every handle dropped; stop serving this peer
            Step::Command(None) => break,
            Step::Event(event) => connection.handle_event(event),
            Step::Link(Some(event)) => connection.handle_link_event(event),
            // The link's tasks are gone without an explicit closure signal
            Step::Link(None) => connection.handle_link_event(LinkEvent::Closed {
                reason: "link event channel closed".to_string(),
            }),
        }
    }

    connection.teardown();
    tracing::debug!(peer_id = %connection.peer_id(), "Connection actor stopped");
}

/// Resolves to the next event of the live link, or never if there is none.
async fn next_link_event(events: Option<&mut mpsc::Receiver<LinkEvent>>) -> Option<LinkEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
