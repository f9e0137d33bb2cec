//! Topic registry and non-blocking fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::{EventKind, EventPublisher, OrderEvent};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{EventBusError, Inbox, InboxId, Result};

/// Capacity used when a subscriber does not ask for another.
pub const DEFAULT_INBOX_CAPACITY: usize = 100;

struct Slot {
    sender: mpsc::Sender<OrderEvent>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
struct Registry {
    inboxes: HashMap<InboxId, Slot>,
    topics: HashMap<EventKind, Vec<InboxId>>,
    next_id: u64,
    closed: bool,
}

/// Topic-based publish/subscribe dispatcher for [`OrderEvent`]s.
///
/// Publishing takes the registry's read lock and deposits with `try_send`,
/// so it never waits on a subscriber. Closing takes the write lock: a publish
/// already in progress finishes its deposits first, and any later publish is
/// a no-op. Clones share the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Creates a new open bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a bounded inbox. It receives nothing until subscribed to a kind.
    pub fn open_inbox(&self, capacity: usize) -> Result<Inbox> {
        if capacity == 0 {
            return Err(EventBusError::ZeroCapacity);
        }
        let mut registry = self.registry.write();
        if registry.closed {
            return Err(EventBusError::Closed);
        }

        let id = InboxId(registry.next_id);
        registry.next_id += 1;
        let (sender, receiver) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        registry.inboxes.insert(
            id,
            Slot {
                sender,
                dropped: dropped.clone(),
            },
        );
        tracing::debug!(inbox = %id, capacity, "inbox opened");
        Ok(Inbox::new(id, capacity, receiver, dropped))
    }

    /// Registers `inbox` under `kind`. Registering the same pair twice has
    /// no further effect.
    pub fn subscribe(&self, kind: EventKind, inbox: InboxId) -> Result<()> {
        let mut registry = self.registry.write();
        if registry.closed {
            return Err(EventBusError::Closed);
        }
        if !registry.inboxes.contains_key(&inbox) {
            return Err(EventBusError::UnknownInbox(inbox));
        }
        let subscribers = registry.topics.entry(kind).or_default();
        if !subscribers.contains(&inbox) {
            subscribers.push(inbox);
            tracing::debug!(%inbox, %kind, "subscribed");
        }
        Ok(())
    }

    /// Opens an inbox and registers it under every kind in `kinds`.
    pub fn subscribe_new(&self, kinds: &[EventKind], capacity: usize) -> Result<Inbox> {
        let inbox = self.open_inbox(capacity)?;
        for kind in kinds {
            self.subscribe(*kind, inbox.id())?;
        }
        Ok(inbox)
    }

    /// Removes one registration. Does nothing if it does not exist.
    pub fn unsubscribe(&self, kind: EventKind, inbox: InboxId) {
        let mut registry = self.registry.write();
        if let Some(subscribers) = registry.topics.get_mut(&kind) {
            subscribers.retain(|id| *id != inbox);
            if subscribers.is_empty() {
                registry.topics.remove(&kind);
            }
        }
    }

    /// Removes every registration of `inbox` and closes it. Its owner drains
    /// what was deposited and then sees the end of the stream.
    pub fn remove_inbox(&self, inbox: InboxId) {
        let mut registry = self.registry.write();
        registry.topics.retain(|_, subscribers| {
            subscribers.retain(|id| *id != inbox);
            !subscribers.is_empty()
        });
        registry.inboxes.remove(&inbox);
    }

    /// Closes every inbox and refuses further publishing and subscribing.
    pub fn close(&self) {
        let mut registry = self.registry.write();
        if registry.closed {
            return;
        }
        registry.closed = true;
        registry.topics.clear();
        let inboxes = registry.inboxes.len();
        registry.inboxes.clear();
        tracing::info!(inboxes, dropped = self.dropped_total(), "event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.registry.read().closed
    }

    /// Number of inboxes registered under `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry.read().topics.get(&kind).map_or(0, Vec::len)
    }

    /// Number of deposits dropped across all inboxes since the bus opened.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Deposits `event` into every inbox registered under its kind, then a
    /// generic copy into every inbox registered under the generic kind.
    ///
    /// A full or closed inbox loses the event; nothing is reported to the
    /// caller.
    pub fn publish(&self, event: OrderEvent) {
        let registry = self.registry.read();
        if registry.closed {
            tracing::trace!(kind = %event.kind, "publish after close ignored");
            return;
        }

        if event.kind.is_generic() {
            self.deposit(&registry, event);
            return;
        }
        let generic = event.to_generic();
        self.deposit(&registry, event);
        self.deposit(&registry, generic);
    }

    fn deposit(&self, registry: &Registry, event: OrderEvent) {
        let Some(subscribers) = registry.topics.get(&event.kind) else {
            return;
        };
        for id in subscribers {
            let Some(slot) = registry.inboxes.get(id) else {
                continue;
            };
            match slot.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.record_drop(slot, *id, event.kind, "full"),
                Err(TrySendError::Closed(_)) => {
                    self.record_drop(slot, *id, event.kind, "receiver gone")
                }
            }
        }
    }

    fn record_drop(&self, slot: &Slot, inbox: InboxId, kind: EventKind, reason: &'static str) {
        slot.dropped.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("event_bus_dropped_total", "kind" => kind.as_str()).increment(1);
        tracing::debug!(%inbox, %kind, reason, "event dropped");
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: OrderEvent) {
        EventBus::publish(self, event);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("EventBus")
            .field("inboxes", &registry.inboxes.len())
            .field("topics", &registry.topics.len())
            .field("closed", &registry.closed)
            .field("dropped", &self.dropped_total())
            .finish()
    }
}
