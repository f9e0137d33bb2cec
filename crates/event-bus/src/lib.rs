//! In-process event bus for order events.
//!
//! Publishing never blocks: each subscriber owns a bounded [`Inbox`] and an
//! event that does not fit is dropped for that subscriber only. Every event
//! of a specific kind is also delivered to subscribers of the generic
//! `order.status.changed` kind.

pub mod bus;
pub mod error;
pub mod inbox;
pub mod subscriber;

pub use bus::{DEFAULT_INBOX_CAPACITY, EventBus};
pub use error::{EventBusError, Result};
pub use inbox::{Inbox, InboxId};
pub use subscriber::{EventHandler, SubscriberHandle, spawn_subscriber};
