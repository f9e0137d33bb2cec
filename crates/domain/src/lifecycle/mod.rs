//! Per-order-type state machines.
//!
//! Each status of each order type is a small [`OrderState`] object that
//! knows where it may go next and what happens on entry. The trait's default
//! methods are the shared base behavior; the per-type modules override only
//! what they need. [`OrderStrategy`] maps statuses to these objects and
//! [`OrderLifecycle`] drives validated transitions.

mod closing;
mod custom;
mod driver;
mod inventory;
mod sale;
mod stock;
mod strategy;

use std::sync::Arc;

use async_trait::async_trait;
use common::{ItemId, OrderId, VariantId};
use thiserror::Error;

use crate::events::{EventKind, OrderEvent};
use crate::order::{Order, OrderStatus, OrderType};
use crate::ports::{
    CustomerRepository, EventPublisher, NoopPublisher, OrderItemRepository, RepositoryError,
    VariantRepository,
};

pub use driver::OrderLifecycle;
pub use strategy::OrderStrategy;

/// Errors that abort a transition. The order's status is left unchanged.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The current state does not allow moving to the requested status.
    #[error("Invalid transition for {order_type} order: {from} -> {to}")]
    InvalidTransition {
        order_type: OrderType,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// No state object is registered for the status.
    #[error("No {status} state registered for {order_type} orders")]
    UnknownStatus {
        order_type: OrderType,
        status: OrderStatus,
    },

    /// A reserve-or-fail path found too little available stock.
    #[error(
        "Insufficient stock for item {item_id} (variant {variant_id}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        item_id: ItemId,
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// A reserve-or-fail path met an item without an existing variant.
    #[error("Item {item_id} has no existing variant to sell from")]
    MissingVariant { item_id: ItemId },

    /// A collaborator required by this state was not configured.
    #[error("Missing dependency: {0}")]
    MissingDependency(&'static str),

    /// Automatic transitions did not settle.
    #[error("Order {order_id} kept auto-advancing after {hops} hops")]
    AutoAdvanceLimit { order_id: OrderId, hops: usize },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Collaborators handed to state objects when a strategy is built.
///
/// Repositories are optional: states that only release stock degrade to a
/// logged no-op when theirs is missing, while reserve-or-fail states refuse
/// to proceed.
#[derive(Clone)]
pub struct StateDeps {
    pub variants: Option<Arc<dyn VariantRepository>>,
    pub items: Option<Arc<dyn OrderItemRepository>>,
    pub customers: Option<Arc<dyn CustomerRepository>>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl StateDeps {
    /// Creates dependencies with only a publisher.
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            variants: None,
            items: None,
            customers: None,
            publisher,
        }
    }

    /// Uses one store for every repository port.
    pub fn from_store<S>(store: S, publisher: Arc<dyn EventPublisher>) -> Self
    where
        S: VariantRepository + OrderItemRepository + CustomerRepository + Clone + 'static,
    {
        Self {
            variants: Some(Arc::new(store.clone())),
            items: Some(Arc::new(store.clone())),
            customers: Some(Arc::new(store)),
            publisher,
        }
    }

    pub fn with_variants(mut self, variants: Arc<dyn VariantRepository>) -> Self {
        self.variants = Some(variants);
        self
    }

    pub fn with_items(mut self, items: Arc<dyn OrderItemRepository>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_customers(mut self, customers: Arc<dyn CustomerRepository>) -> Self {
        self.customers = Some(customers);
        self
    }
}

impl Default for StateDeps {
    fn default() -> Self {
        Self::new(Arc::new(NoopPublisher))
    }
}

/// Behavior of one status of one order type.
///
/// The driver calls, in order: [`can_transition_to`](Self::can_transition_to)
/// on the current state, [`on_exit`](Self::on_exit) on the current state,
/// then [`on_enter`](Self::on_enter) on the target with the order already
/// carrying the target status, and finally
/// [`determine_next_state`](Self::determine_next_state) on the target.
#[async_trait]
pub trait OrderState: Send + Sync {
    fn status(&self) -> OrderStatus;

    /// Statuses reachable from this one for `order`. Empty for terminal states.
    fn allowed_transitions(&self, order: &Order) -> &'static [OrderStatus];

    fn can_transition_to(&self, order: &Order, target: OrderStatus) -> bool {
        self.allowed_transitions(order).contains(&target)
    }

    /// Side effects of entering this status. An error aborts the transition.
    async fn on_enter(&self, _order: &mut Order, _previous: Option<OrderStatus>) -> Result<()> {
        Ok(())
    }

    /// Side effects of leaving this status. An error aborts the transition.
    async fn on_exit(&self, _order: &Order, _next: OrderStatus) -> Result<()> {
        Ok(())
    }

    /// A status to move to immediately after entry, without external input.
    fn determine_next_state(&self, _order: &Order) -> Option<OrderStatus> {
        None
    }
}

/// A status whose only entry effect is announcing itself.
pub(crate) struct AnnounceState {
    status: OrderStatus,
    kind: EventKind,
    transitions: &'static [OrderStatus],
    publisher: Arc<dyn EventPublisher>,
}

impl AnnounceState {
    pub(crate) fn new(
        status: OrderStatus,
        kind: EventKind,
        transitions: &'static [OrderStatus],
        deps: &StateDeps,
    ) -> Self {
        Self {
            status,
            kind,
            transitions,
            publisher: deps.publisher.clone(),
        }
    }
}

#[async_trait]
impl OrderState for AnnounceState {
    fn status(&self) -> OrderStatus {
        self.status
    }

    fn allowed_transitions(&self, _order: &Order) -> &'static [OrderStatus] {
        self.transitions
    }

    async fn on_enter(&self, order: &mut Order, previous: Option<OrderStatus>) -> Result<()> {
        self.publisher
            .publish(OrderEvent::transition(self.kind, order, previous));
        Ok(())
    }
}

pub(crate) const TERMINAL: &[OrderStatus] = &[];
