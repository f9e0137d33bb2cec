//! States of made-to-order (Custom) orders.

use std::sync::Arc;

use async_trait::async_trait;

use super::closing::{CancelledState, DeliveredState, FinishedState, Release};
use super::stock::{self, DeliveryRelease};
use super::{AnnounceState, OrderState, Result, StateDeps};
use crate::events::{EventKind, OrderEvent};
use crate::order::{Order, OrderStatus};

const FROM_QUOTE: &[OrderStatus] = &[OrderStatus::Approved, OrderStatus::Cancelled];
const FROM_APPROVED: &[OrderStatus] = &[OrderStatus::Manufacturing, OrderStatus::Cancelled];
const FROM_APPROVED_COVERED: &[OrderStatus] = &[OrderStatus::Finished, OrderStatus::Cancelled];
const FROM_MANUFACTURING: &[OrderStatus] = &[OrderStatus::Finished, OrderStatus::Cancelled];
const FROM_FINISHED: &[OrderStatus] = &[OrderStatus::Delivered, OrderStatus::Cancelled];

/// Builds every Custom state.
pub(crate) fn states(deps: &StateDeps) -> Vec<Arc<dyn OrderState>> {
    vec![
        Arc::new(AnnounceState::new(
            OrderStatus::Quote,
            EventKind::StatusChanged,
            FROM_QUOTE,
            deps,
        )),
        Arc::new(ApprovedState { deps: deps.clone() }),
        Arc::new(AnnounceState::new(
            OrderStatus::Manufacturing,
            EventKind::OrderManufacturing,
            FROM_MANUFACTURING,
            deps,
        )),
        Arc::new(FinishedState::new(
            EventKind::OrderFinished,
            FROM_FINISHED,
            deps,
        )),
        Arc::new(DeliveredState::new(
            EventKind::OrderDelivered,
            DeliveryRelease::ItemReservation,
            deps,
        )),
        Arc::new(CancelledState::new(Release::Reserved, deps)),
    ]
}

/// Reserves what existing stock covers; skips manufacturing when that is
/// everything.
struct ApprovedState {
    deps: StateDeps,
}

#[async_trait]
impl OrderState for ApprovedState {
    fn status(&self) -> OrderStatus {
        OrderStatus::Approved
    }

    fn allowed_transitions(&self, order: &Order) -> &'static [OrderStatus] {
        if order.has_full_stock_coverage() {
            FROM_APPROVED_COVERED
        } else {
            FROM_APPROVED
        }
    }

    async fn on_enter(&self, order: &mut Order, previous: Option<OrderStatus>) -> Result<()> {
        let moves = stock::reserve_available(order, &self.deps).await?;
        tracing::info!(
            order_id = %order.id(),
            reserved_items = moves.len(),
            shortfall = order.total_shortfall(),
            "custom order approved"
        );
        self.deps.publisher.publish(OrderEvent::transition(
            EventKind::OrderApproved,
            order,
            previous,
        ));
        stock::announce(&self.deps, EventKind::StockReserved, order, &moves);
        Ok(())
    }

    fn determine_next_state(&self, order: &Order) -> Option<OrderStatus> {
        order
            .has_full_stock_coverage()
            .then_some(OrderStatus::Finished)
    }
}
