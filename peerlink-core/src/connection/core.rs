//! Core connection state machine for the actor model.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use super::availability::AvailabilityMeter;
use super::backlog::{PendingRequest, RequestBacklog};
use super::commands::{ConnectionCommand, ConnectionStats};
use super::{ConnectionError, ConnectionState, PeerId};
use crate::config::ConnectionConfig;
use crate::protocol::Codec;
use crate::transport::{Link, LinkEvent, Transport, TransportError};

/// Feedback events from the actor's own detached tasks.
pub(crate) enum ConnectionEvent {
    /// A connect attempt finished.
    ConnectFinished {
        attempt: u64,
        outcome: Result<Box<dyn Link>, TransportError>,
    },
    /// The reconnection-loop timer fired.
    DialDue,
    /// A request's deadline elapsed.
    RequestExpired { request_id: u32 },
}

/// Link association of a connection.
enum LinkState {
    /// Created; the first connect attempt has not succeeded yet.
    Initializing,
    /// A live link is established.
    Connected(Box<dyn Link>),
    /// The link dropped; the reconnection loop is running.
    Disconnected,
}

/// Per-peer connection state machine.
///
/// Owned by a single actor task; every mutation happens on that task, so
/// no locking is needed anywhere in here. Transport dials and deadline
/// timers run as detached tasks and feed their outcomes back through the
/// [`ConnectionEvent`] channel, which keeps a hung dial or a slow socket
/// from ever delaying command processing.
pub(crate) struct PeerConnection {
    peer_id: PeerId,
    address: SocketAddr,
    link: LinkState,
    backlog: RequestBacklog,
    availability: AvailabilityMeter,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    config: ConnectionConfig,
    /// Sender handed to detached tasks for event feedback
    events: mpsc::UnboundedSender<ConnectionEvent>,
    /// Inbound event channel of the live link, if any
    link_events: Option<mpsc::Receiver<LinkEvent>>,
    /// Event channel of the connect attempt currently in flight
    pending_link_events: Option<(u64, mpsc::Receiver<LinkEvent>)>,
    /// Sequence number of the most recent connect attempt; outcomes from
    /// superseded attempts are discarded
    attempt: u64,
    /// Dial task currently in flight, aborted at teardown
    dial_task: Option<AbortHandle>,
    /// Reconnection-loop timer waiting to fire
    reconnect_timer: Option<AbortHandle>,
    requests_sent: u64,
    replies_received: u64,
    timeouts: u64,
}

impl PeerConnection {
    pub fn new(
        peer_id: PeerId,
        address: SocketAddr,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        config: ConnectionConfig,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            peer_id,
            address,
            link: LinkState::Initializing,
            backlog: RequestBacklog::new(),
            availability: AvailabilityMeter::new(),
            transport,
            codec,
            config,
            events,
            link_events: None,
            pending_link_events: None,
            attempt: 0,
            dial_task: None,
            reconnect_timer: None,
            requests_sent: 0,
            replies_received: 0,
            timeouts: 0,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Externally observable state: `Initializing` reports as
    /// `Disconnected` because no live link exists yet.
    pub fn state(&self) -> ConnectionState {
        match self.link {
            LinkState::Connected(_) => ConnectionState::Connected,
            LinkState::Initializing | LinkState::Disconnected => ConnectionState::Disconnected,
        }
    }

    /// Receiver for events of the live link, if one is established.
    pub fn link_events_mut(&mut self) -> Option<&mut mpsc::Receiver<LinkEvent>> {
        self.link_events.as_mut()
    }

    /// Handles a single command. Returns false to shut the actor down.
    pub fn handle_command(&mut self, command: ConnectionCommand) -> bool {
        match command {
            ConnectionCommand::SendMessage {
                payload,
                timeout,
                responder,
            } => {
                self.send_message(payload, timeout, responder);
            }
            ConnectionCommand::GetAvailability { reset, responder } => {
                let _ = responder.send(self.availability_report(reset));
            }
            ConnectionCommand::GetStats { responder } => {
                let _ = responder.send(self.stats());
            }
            ConnectionCommand::SetAddress { address, responder } => {
                tracing::debug!(peer_id = %self.peer_id, address = %address, "Peer address updated");
                self.address = address;
                let _ = responder.send(());
            }
            ConnectionCommand::Shutdown { responder } => {
                let _ = responder.send(());
                return false;
            }
        }
        true
    }

    /// Handles feedback from one of the actor's detached tasks.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::ConnectFinished { attempt, outcome } => {
                self.handle_connect_finished(attempt, outcome);
            }
            ConnectionEvent::DialDue => self.handle_dial_due(),
            ConnectionEvent::RequestExpired { request_id } => {
                self.handle_request_expired(request_id);
            }
        }
    }

    /// Dispatches a background connect attempt against the current address.
    ///
    /// The attempt runs detached; a slow or hanging dial delays only the
    /// next attempt, never command processing. The retry timer is armed
    /// when the failure outcome arrives, which keeps attempts sequential
    /// and spaced by the fixed interval.
    pub fn dial(&mut self) {
        self.attempt += 1;
        let attempt = self.attempt;
        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer);
        self.pending_link_events = Some((attempt, events_rx));

        let transport = Arc::clone(&self.transport);
        let address = self.address;
        let feedback = self.events.clone();
        tracing::debug!(peer_id = %self.peer_id, address = %address, attempt, "Dialing peer");

        let dial = tokio::spawn(async move {
            let outcome = transport.connect(address, events_tx).await;
            let _ = feedback.send(ConnectionEvent::ConnectFinished { attempt, outcome });
        });
        self.dial_task = Some(dial.abort_handle());
    }

    fn arm_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }

        let interval = self.config.reconnect_interval;
        let feedback = self.events.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = feedback.send(ConnectionEvent::DialDue);
        });
        self.reconnect_timer = Some(timer.abort_handle());
    }

    fn handle_dial_due(&mut self) {
        self.reconnect_timer = None;
        if !self.state().is_connected() {
            self.dial();
        }
    }

    /// Applies the outcome of a connect attempt.
    fn handle_connect_finished(
        &mut self,
        attempt: u64,
        outcome: Result<Box<dyn Link>, TransportError>,
    ) {
        if attempt != self.attempt {
            // A superseded dial resolved late; drop whatever it produced
            tracing::debug!(peer_id = %self.peer_id, attempt, "Discarding stale connect outcome");
            return;
        }
        self.dial_task = None;

        match outcome {
            Ok(link) => {
                let Some((_, events_rx)) = self.pending_link_events.take() else {
                    return;
                };
                self.link = LinkState::Connected(link);
                self.link_events = Some(events_rx);
                self.availability.mark_connected(Instant::now());
                tracing::debug!(peer_id = %self.peer_id, address = %self.address, "Peer connected");
            }
            Err(error) => {
                // Observed internally only; callers see Closed while down
                tracing::debug!(
                    peer_id = %self.peer_id,
                    address = %self.address,
                    error = %error,
                    "Connect attempt failed"
                );
                self.pending_link_events = None;
                self.arm_reconnect_timer();
            }
        }
    }

    /// Accepts a request for transmission, or fails it immediately.
    ///
    /// The disconnected path resolves the caller without touching the
    /// transport, so its latency is independent of the request timeout
    /// and of any dial in flight.
    fn send_message(
        &mut self,
        payload: Bytes,
        timeout: Duration,
        responder: oneshot::Sender<Result<Bytes, ConnectionError>>,
    ) {
        let LinkState::Connected(link) = &self.link else {
            let _ = responder.send(Err(ConnectionError::Closed));
            return;
        };

        let request_id = self.backlog.allocate_id();
        let frame = self.codec.encode(request_id, &payload);

        if let Err(error) = link.send(frame) {
            tracing::debug!(
                peer_id = %self.peer_id,
                request_id,
                error = %error,
                "Transmit failed, disconnecting"
            );
            let _ = responder.send(Err(ConnectionError::Transport(error)));
            self.drop_link();
            return;
        }

        self.requests_sent += 1;
        let timer = self.spawn_deadline(request_id, timeout);
        self.backlog.insert(
            request_id,
            PendingRequest {
                responder,
                issued_at: Instant::now(),
                timer,
            },
        );
    }

    fn spawn_deadline(&self, request_id: u32, timeout: Duration) -> AbortHandle {
        let feedback = self.events.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = feedback.send(ConnectionEvent::RequestExpired { request_id });
        });
        timer.abort_handle()
    }

    /// Settles a request whose deadline elapsed before a reply arrived.
    ///
    /// Only the availability accounting reacts; the link itself stays up
    /// until the transport reports a failure.
    fn handle_request_expired(&mut self, request_id: u32) {
        let Some(request) = self.backlog.remove(request_id) else {
            // Already settled by a reply or failure; the timer lost the race
            return;
        };

        self.timeouts += 1;
        self.availability.record_timeout(request.issued_at.elapsed());
        tracing::debug!(peer_id = %self.peer_id, request_id, "Request timed out");
        let _ = request.responder.send(Err(ConnectionError::Timeout { request_id }));
    }

    /// Handles an event pushed by the live link.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(frame) => self.handle_frame(frame),
            LinkEvent::Closed { reason } => self.handle_closure(&reason),
        }
    }

    fn handle_frame(&mut self, frame: Bytes) {
        let envelope = match self.codec.decode(&frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(peer_id = %self.peer_id, error = %error, "Dropping undecodable frame");
                return;
            }
        };

        let Some(request) = self.backlog.remove(envelope.request_id) else {
            // Late or duplicate reply; its request already settled
            tracing::trace!(
                peer_id = %self.peer_id,
                request_id = envelope.request_id,
                "Dropping unmatched reply"
            );
            return;
        };

        self.replies_received += 1;
        let _ = request.responder.send(Ok(envelope.payload));
    }

    /// Transport signalled closure: fail the whole backlog and reconnect.
    fn handle_closure(&mut self, reason: &str) {
        tracing::debug!(peer_id = %self.peer_id, reason, "Link closed");
        self.backlog.fail_all(|| ConnectionError::Closed);
        self.drop_link();
    }

    /// Drops the live link and restarts the reconnection loop.
    fn drop_link(&mut self) {
        self.link = LinkState::Disconnected;
        self.link_events = None;
        self.availability.mark_disconnected();
        self.dial();
    }

    fn availability_report(&mut self, reset: bool) -> u64 {
        if self.state().is_connected() {
            return 0;
        }
        self.availability.report(reset)
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            peer_id: self.peer_id,
            address: self.address,
            state: self.state(),
            connected_for: self
                .availability
                .connected_since()
                .map(|since| since.elapsed()),
            outstanding_requests: self.backlog.len(),
            requests_sent: self.requests_sent,
            replies_received: self.replies_received,
            timeouts: self.timeouts,
            connect_attempts: self.attempt,
        }
    }

    /// Fails all waiters and stops every pending timer and dial.
    pub fn teardown(&mut self) {
        self.backlog.fail_all(|| ConnectionError::Shutdown);
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(dial) = self.dial_task.take() {
            dial.abort();
        }
        self.link = LinkState::Disconnected;
        self.link_events = None;
        self.availability.mark_disconnected();
    }
}
