//! Validated status changes.

use std::sync::Arc;

use super::{LifecycleError, OrderState, OrderStrategy, Result, StateDeps, stock};
use crate::order::{Order, OrderStatus, OrderType};

/// Moves orders through their type's state machine.
///
/// Every change goes through the same sequence: validate against the current
/// state, run its exit action, run the target's entry action on a working
/// copy, commit the copy, then follow any automatic transitions the new
/// state reports. A failed step leaves the order at its last committed
/// status.
pub struct OrderLifecycle {
    custom: OrderStrategy,
    inventory: OrderStrategy,
    sale: OrderStrategy,
    deps: StateDeps,
}

impl OrderLifecycle {
    /// Builds the strategies of every order type around `deps`.
    pub fn new(deps: StateDeps) -> Self {
        Self {
            custom: OrderStrategy::custom(&deps),
            inventory: OrderStrategy::inventory(&deps),
            sale: OrderStrategy::sale(&deps),
            deps,
        }
    }

    pub fn strategy(&self, order_type: OrderType) -> &OrderStrategy {
        match order_type {
            OrderType::Custom => &self.custom,
            OrderType::Inventory => &self.inventory,
            OrderType::Sale => &self.sale,
        }
    }

    /// Stores a new order's items, enters its initial status and follows
    /// automatic transitions.
    ///
    /// Items stay stored when the entry action fails; storing them again is
    /// an upsert.
    ///
    /// Returns every status the order passed through, starting with the
    /// initial one.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), order_type = %order.order_type()))]
    pub async fn start(&self, order: &mut Order) -> Result<Vec<OrderStatus>> {
        let initial = self.strategy(order.order_type()).initial_status();
        let state = self.state(order.order_type(), initial)?;

        let mut working = order.clone();
        working.set_status(initial);
        // Items are stored before entry so a storage failure cannot strand
        // reservations made by the initial state.
        stock::register_items(&working, &self.deps).await?;
        state.on_enter(&mut working, None).await?;
        *order = working;
        record_transition(order);
        tracing::info!(status = %initial, "order started");

        let mut path = vec![initial];
        self.auto_advance(order, &mut path).await?;
        Ok(path)
    }

    /// Moves `order` to `target` and then through any automatic transitions.
    ///
    /// Returns the statuses entered, `target` first. If `target` itself is
    /// rejected or its entry fails, the order is unchanged.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), from = %order.status()))]
    pub async fn transition(
        &self,
        order: &mut Order,
        target: OrderStatus,
    ) -> Result<Vec<OrderStatus>> {
        self.step(order, target).await?;
        let mut path = vec![target];
        self.auto_advance(order, &mut path).await?;
        Ok(path)
    }

    /// True if `order` may move to `target` from where it is now.
    pub fn can_transition(&self, order: &Order, target: OrderStatus) -> bool {
        self.strategy(order.order_type())
            .can_transition(order, order.status(), target)
    }

    async fn step(&self, order: &mut Order, target: OrderStatus) -> Result<()> {
        let order_type = order.order_type();
        let from = order.status();
        let current = self.state(order_type, from)?;
        if !current.can_transition_to(order, target) {
            tracing::warn!(%from, to = %target, "transition rejected");
            return Err(LifecycleError::InvalidTransition {
                order_type,
                from,
                to: target,
            });
        }
        let next = self.state(order_type, target)?;

        let mut working = order.clone();
        current.on_exit(&working, target).await?;
        working.set_status(target);
        next.on_enter(&mut working, Some(from)).await?;
        *order = working;

        record_transition(order);
        tracing::info!(%from, to = %target, "order transitioned");
        Ok(())
    }

    /// Bounded by the number of statuses of the type, since no legal path
    /// can be longer.
    async fn auto_advance(&self, order: &mut Order, path: &mut Vec<OrderStatus>) -> Result<()> {
        let limit = order.order_type().statuses().len();
        for _ in 0..limit {
            let state = self.state(order.order_type(), order.status())?;
            let Some(next) = state.determine_next_state(order) else {
                return Ok(());
            };
            tracing::debug!(from = %order.status(), to = %next, "auto-advancing");
            self.step(order, next).await?;
            path.push(next);
        }
        Err(LifecycleError::AutoAdvanceLimit {
            order_id: order.id(),
            hops: limit,
        })
    }

    fn state(&self, order_type: OrderType, status: OrderStatus) -> Result<&Arc<dyn OrderState>> {
        self.strategy(order_type)
            .state(status)
            .ok_or(LifecycleError::UnknownStatus { order_type, status })
    }
}

fn record_transition(order: &Order) {
    metrics::counter!(
        "lifecycle_transitions_total",
        "order_type" => order.order_type().as_str(),
        "status" => order.status().as_str()
    )
    .increment(1);
}
