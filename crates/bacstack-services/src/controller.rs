//! Per-destination serialization of confirmed requests.
//!
//! Each destination with confirmed work in flight gets one controller. A
//! controller sends at most one request at a time and releases the next
//! queued request only after the active one is resolved.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use bacstack_core::{Address, Apdu};

/// How a confirmed request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Simple or complex ack.
    Success(Apdu),
    /// Error, reject or abort from the peer.
    Failure(Apdu),
    /// Expired by whoever owns the request's timeout.
    TimedOut,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The response message, if one arrived.
    pub fn response(&self) -> Option<&Apdu> {
        match self {
            Outcome::Success(apdu) | Outcome::Failure(apdu) => Some(apdu),
            Outcome::TimedOut => None,
        }
    }
}

struct Shared {
    request: Apdu,
    outcome: Mutex<Option<Outcome>>,
    resolved: Notify,
}

/// One confirmed request plus its single-assignment result slot.
///
/// Clones share the slot: the controller keeps one, the caller awaits another.
#[derive(Clone)]
pub struct PendingRequest {
    inner: Arc<Shared>,
}

impl PendingRequest {
    pub fn new(request: Apdu) -> Self {
        Self {
            inner: Arc::new(Shared {
                request,
                outcome: Mutex::new(None),
                resolved: Notify::new(),
            }),
        }
    }

    pub fn request(&self) -> &Apdu {
        &self.inner.request
    }

    /// Current outcome without waiting.
    pub fn outcome(&self) -> Option<Outcome> {
        self.slot().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot().is_some()
    }

    /// Wait until the request is resolved.
    pub async fn wait(&self) -> Outcome {
        loop {
            // register before checking so a concurrent resolve is not missed
            let notified = self.inner.resolved.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    /// First assignment wins. Returns false if already resolved.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        {
            let mut slot = self.slot();
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.inner.resolved.notify_waiters();
        true
    }

    fn slot(&self) -> MutexGuard<'_, Option<Outcome>> {
        self.inner
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("destination", &self.inner.request.destination)
            .field("service", &self.inner.request.confirmed_service())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Hands a request to the layer below.
pub type SendFn = Arc<dyn Fn(Apdu) + Send + Sync>;

/// FIFO of confirmed requests for one destination.
pub struct DestinationController {
    address: Address,
    send: SendFn,
    queue: VecDeque<PendingRequest>,
    active: Option<PendingRequest>,
}

impl DestinationController {
    pub fn new(address: Address, send: SendFn) -> Self {
        Self {
            address,
            send,
            queue: VecDeque::new(),
            active: None,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Send now if nothing is in flight, otherwise queue behind it.
    pub fn submit(&mut self, pending: PendingRequest) {
        if self.active.is_none() {
            self.activate(pending);
        } else {
            self.queue.push_back(pending);
            tracing::trace!(
                destination = %self.address,
                queued = self.queue.len(),
                "request queued"
            );
        }
    }

    /// Resolve the active request and start the next one.
    ///
    /// Returns the finished request, or `None` if nothing was active.
    pub fn resolve(&mut self, outcome: Outcome) -> Option<PendingRequest> {
        let finished = self.active.take()?;
        if !finished.resolve(outcome) {
            tracing::debug!(destination = %self.address, "active request was already resolved");
        }
        if let Some(next) = self.queue.pop_front() {
            tracing::debug!(
                destination = %self.address,
                remaining = self.queue.len(),
                "advancing queue"
            );
            self.activate(next);
        }
        Some(finished)
    }

    /// No active request and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active(&self) -> Option<&PendingRequest> {
        self.active.as_ref()
    }

    fn activate(&mut self, pending: PendingRequest) {
        let apdu = pending.request().clone();
        self.active = Some(pending);
        (self.send)(apdu);
    }
}

impl fmt::Debug for DestinationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationController")
            .field("address", &self.address)
            .field("active", &self.active)
            .field("queued", &self.queue.len())
            .finish()
    }
}
