//! Outstanding-request backlog keyed by correlation id.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use super::ConnectionError;

/// A request accepted for transmission and awaiting resolution.
pub(crate) struct PendingRequest {
    /// Caller waiting on the correlated reply
    pub responder: oneshot::Sender<Result<Bytes, ConnectionError>>,
    /// When transmission was accepted
    pub issued_at: Instant,
    /// Deadline timer, aborted when the entry settles early
    pub timer: AbortHandle,
}

/// Outstanding requests keyed by correlation id.
///
/// An entry lives from the moment transmission is accepted until exactly
/// one of reply, timeout, or failure removes it. `remove` is first-wins,
/// so a deadline timer racing a reply settles each request at most once;
/// the loser finds the entry gone and does nothing.
pub(crate) struct RequestBacklog {
    entries: HashMap<u32, PendingRequest>,
    next_request_id: u32,
}

impl RequestBacklog {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_request_id: 0,
        }
    }

    /// Allocates the next request id.
    ///
    /// The counter wraps; ids still present in the backlog are skipped so
    /// a long-lived request can never collide with a wrapped successor.
    pub fn allocate_id(&mut self) -> u32 {
        loop {
            let id = self.next_request_id;
            self.next_request_id = self.next_request_id.wrapping_add(1);
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn insert(&mut self, request_id: u32, request: PendingRequest) {
        self.entries.insert(request_id, request);
    }

    /// Removes and returns the entry for `request_id`, aborting its timer.
    pub fn remove(&mut self, request_id: u32) -> Option<PendingRequest> {
        let request = self.entries.remove(&request_id)?;
        request.timer.abort();
        Some(request)
    }

    /// Fails every outstanding entry with `error` and clears the backlog.
    pub fn fail_all(&mut self, error: impl Fn() -> ConnectionError) {
        for (_, request) in self.entries.drain() {
            request.timer.abort();
            let _ = request.responder.send(Err(error()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
