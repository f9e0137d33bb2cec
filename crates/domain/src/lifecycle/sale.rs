//! States of over-the-counter (Sale) orders.

use std::sync::Arc;

use async_trait::async_trait;

use super::closing::{CancelledState, DeliveredState, Release};
use super::stock::{self, DeliveryRelease};
use super::{AnnounceState, OrderState, Result, StateDeps};
use crate::events::{EventKind, OrderEvent};
use crate::order::{Order, OrderStatus};

const FROM_PENDING: &[OrderStatus] = &[OrderStatus::Confirmed, OrderStatus::Cancelled];
const FROM_CONFIRMED: &[OrderStatus] = &[OrderStatus::Delivered, OrderStatus::Cancelled];

/// Builds every Sale state.
pub(crate) fn states(deps: &StateDeps) -> Vec<Arc<dyn OrderState>> {
    vec![
        Arc::new(PendingState { deps: deps.clone() }),
        Arc::new(AnnounceState::new(
            OrderStatus::Confirmed,
            EventKind::SaleConfirmed,
            FROM_CONFIRMED,
            deps,
        )),
        Arc::new(DeliveredState::new(
            EventKind::SaleDelivered,
            DeliveryRelease::RequestedQuantity,
            deps,
        )),
        Arc::new(CancelledState::new(Release::Reserved, deps)),
    ]
}

/// Sells from existing stock: every item is reserved up front or the sale
/// does not open.
struct PendingState {
    deps: StateDeps,
}

#[async_trait]
impl OrderState for PendingState {
    fn status(&self) -> OrderStatus {
        OrderStatus::Pending
    }

    fn allowed_transitions(&self, _order: &Order) -> &'static [OrderStatus] {
        FROM_PENDING
    }

    async fn on_enter(&self, order: &mut Order, previous: Option<OrderStatus>) -> Result<()> {
        let moves = stock::reserve_all(order, &self.deps).await?;
        tracing::info!(order_id = %order.id(), reserved_items = moves.len(), "sale pending");

        self.deps.publisher.publish(OrderEvent::transition(
            EventKind::SalePending,
            order,
            previous,
        ));
        stock::announce(&self.deps, EventKind::StockReserved, order, &moves);
        Ok(())
    }
}
