use thiserror::Error;

use crate::InboxId;

/// Errors returned when managing subscriptions. Publishing never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    /// The bus was closed and accepts no new inboxes or subscriptions.
    #[error("Event bus is closed")]
    Closed,

    /// Inboxes must hold at least one event.
    #[error("Inbox capacity must be at least 1")]
    ZeroCapacity,

    /// The inbox was removed from the bus or never opened on it.
    #[error("Unknown inbox: {0}")]
    UnknownInbox(InboxId),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
