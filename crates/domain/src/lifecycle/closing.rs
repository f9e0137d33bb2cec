//! Finishing, delivery and cancellation, shared across order types.

use async_trait::async_trait;

use super::stock::{self, DeliveryRelease};
use super::{OrderState, Result, StateDeps, TERMINAL};
use crate::events::{EventKind, OrderEvent};
use crate::order::{Order, OrderStatus, OrderType};
use crate::ports::RepositoryError;

/// Manufacturing is done: announce it and hand what was produced to the
/// inventory side through `product.creation.required`.
///
/// Custom orders produce each item's unreserved shortfall; Inventory orders
/// produce everything they planned.
pub(crate) struct FinishedState {
    kind: EventKind,
    transitions: &'static [OrderStatus],
    deps: StateDeps,
}

impl FinishedState {
    pub(crate) fn new(
        kind: EventKind,
        transitions: &'static [OrderStatus],
        deps: &StateDeps,
    ) -> Self {
        Self {
            kind,
            transitions,
            deps: deps.clone(),
        }
    }
}

#[async_trait]
impl OrderState for FinishedState {
    fn status(&self) -> OrderStatus {
        OrderStatus::Finished
    }

    fn allowed_transitions(&self, _order: &Order) -> &'static [OrderStatus] {
        self.transitions
    }

    async fn on_enter(&self, order: &mut Order, previous: Option<OrderStatus>) -> Result<()> {
        self.deps
            .publisher
            .publish(OrderEvent::transition(self.kind, order, previous));

        let produced = match order.order_type() {
            OrderType::Inventory => stock::full_quantities(order.items()),
            _ => stock::shortfalls(order.items()),
        };
        if !produced.is_empty() {
            tracing::debug!(order_id = %order.id(), items = produced.len(), "product creation required");
            self.deps
                .publisher
                .publish(OrderEvent::product_creation(order, produced));
        }
        Ok(())
    }
}

/// Delivery consumes the reserved stock and completes the sale.
pub(crate) struct DeliveredState {
    kind: EventKind,
    release: DeliveryRelease,
    deps: StateDeps,
}

impl DeliveredState {
    pub(crate) fn new(kind: EventKind, release: DeliveryRelease, deps: &StateDeps) -> Self {
        Self {
            kind,
            release,
            deps: deps.clone(),
        }
    }
}

#[async_trait]
impl OrderState for DeliveredState {
    fn status(&self) -> OrderStatus {
        OrderStatus::Delivered
    }

    fn allowed_transitions(&self, _order: &Order) -> &'static [OrderStatus] {
        TERMINAL
    }

    async fn on_enter(&self, order: &mut Order, previous: Option<OrderStatus>) -> Result<()> {
        let moves = stock::release_for_delivery(order, &self.deps, self.release).await?;
        let internal = is_internal_customer(order, &self.deps).await?;

        self.deps
            .publisher
            .publish(OrderEvent::transition(self.kind, order, previous));
        stock::announce(&self.deps, EventKind::StockReleased, order, &moves);
        self.deps
            .publisher
            .publish(OrderEvent::sale_completed(order, internal));
        Ok(())
    }
}

/// What a cancellation does to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Un-earmark the items' reservations, unless cancelled from Quote.
    Reserved,
    /// Nothing was ever reserved.
    Nothing,
}

pub(crate) struct CancelledState {
    release: Release,
    deps: StateDeps,
}

impl CancelledState {
    pub(crate) fn new(release: Release, deps: &StateDeps) -> Self {
        Self {
            release,
            deps: deps.clone(),
        }
    }
}

#[async_trait]
impl OrderState for CancelledState {
    fn status(&self) -> OrderStatus {
        OrderStatus::Cancelled
    }

    fn allowed_transitions(&self, _order: &Order) -> &'static [OrderStatus] {
        TERMINAL
    }

    async fn on_enter(&self, order: &mut Order, previous: Option<OrderStatus>) -> Result<()> {
        // A quote has not reserved anything yet.
        let moves = match self.release {
            Release::Reserved if previous != Some(OrderStatus::Quote) => {
                stock::release_for_cancel(order, &self.deps).await?
            }
            Release::Reserved | Release::Nothing => Vec::new(),
        };
        tracing::info!(order_id = %order.id(), ?previous, "order cancelled");

        self.deps.publisher.publish(OrderEvent::transition(
            EventKind::OrderCancelled,
            order,
            previous,
        ));
        stock::announce(&self.deps, EventKind::StockReleased, order, &moves);
        Ok(())
    }
}

/// True when the order's customer is flagged internal.
///
/// Anonymous orders, unknown customers and a missing customer repository all
/// count as external.
pub(crate) async fn is_internal_customer(order: &Order, deps: &StateDeps) -> Result<bool> {
    let Some(customer_id) = order.customer_id() else {
        return Ok(false);
    };
    let Some(customers) = deps.customers.as_deref() else {
        tracing::warn!(order_id = %order.id(), "no customer repository, treating customer as external");
        return Ok(false);
    };
    match customers.get_customer(customer_id).await {
        Ok(customer) => Ok(customer.is_some_and(|c| c.is_internal)),
        Err(RepositoryError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
