//! States of stock-building (Inventory) orders.
//!
//! Inventory orders never reserve: they manufacture straight into stock.

use std::sync::Arc;

use super::closing::{CancelledState, FinishedState, Release};
use super::{AnnounceState, OrderState, StateDeps, TERMINAL};
use crate::events::EventKind;
use crate::order::OrderStatus;

const FROM_PLANNED: &[OrderStatus] = &[OrderStatus::Manufacturing, OrderStatus::Cancelled];
const FROM_MANUFACTURING: &[OrderStatus] = &[OrderStatus::Finished, OrderStatus::Cancelled];

/// Builds every Inventory state.
pub(crate) fn states(deps: &StateDeps) -> Vec<Arc<dyn OrderState>> {
    vec![
        Arc::new(AnnounceState::new(
            OrderStatus::Planned,
            EventKind::InventoryPlanned,
            FROM_PLANNED,
            deps,
        )),
        Arc::new(AnnounceState::new(
            OrderStatus::Manufacturing,
            EventKind::InventoryManufacturing,
            FROM_MANUFACTURING,
            deps,
        )),
        Arc::new(FinishedState::new(
            EventKind::InventoryFinished,
            TERMINAL,
            deps,
        )),
        Arc::new(CancelledState::new(Release::Nothing, deps)),
    ]
}
