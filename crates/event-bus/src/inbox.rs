//! Receiving side of a subscription.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::OrderEvent;
use tokio::sync::mpsc;

/// Identifies an inbox within the bus that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InboxId(pub(crate) u64);

impl std::fmt::Display for InboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inbox-{}", self.0)
    }
}

/// A bounded FIFO queue of events owned by one subscriber.
///
/// The bus keeps the sending half. Once the bus is closed or the inbox is
/// removed, [`recv`](Self::recv) returns what was already deposited and then
/// `None`.
#[derive(Debug)]
pub struct Inbox {
    id: InboxId,
    capacity: usize,
    receiver: mpsc::Receiver<OrderEvent>,
    dropped: Arc<AtomicU64>,
}

impl Inbox {
    pub(crate) fn new(
        id: InboxId,
        capacity: usize,
        receiver: mpsc::Receiver<OrderEvent>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            capacity,
            receiver,
            dropped,
        }
    }

    pub fn id(&self) -> InboxId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for the next event. Returns `None` once the inbox is closed and
    /// empty.
    pub async fn recv(&mut self) -> Option<OrderEvent> {
        self.receiver.recv().await
    }

    /// Takes the next event if one is waiting.
    pub fn try_recv(&mut self) -> Option<OrderEvent> {
        self.receiver.try_recv().ok()
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Number of events the bus could not deposit here.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
