//! The order entity.

use chrono::{DateTime, Utc};
use common::{CustomerId, ItemId, Money, OrderId};
use serde::{Deserialize, Serialize};

use super::{OrderItem, OrderStatus, OrderType};

/// A unit of commercial work moving through its type's status graph.
///
/// The status is only readable from outside this crate. It changes through
/// [`OrderLifecycle`](crate::OrderLifecycle), which validates every step
/// against the order type's state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_type: OrderType,
    status: OrderStatus,
    customer_id: Option<CustomerId>,
    items: Vec<OrderItem>,
    total_amount: Money,
    discount: Money,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in its type's initial status.
    ///
    /// The total amount is the sum of the item totals. The initial state's
    /// entry action has not run yet; hand the order to
    /// [`OrderLifecycle::start`](crate::OrderLifecycle::start) for that.
    pub fn new(
        order_type: OrderType,
        customer_id: Option<CustomerId>,
        items: Vec<OrderItem>,
        discount: Money,
    ) -> Self {
        let total_amount = items.iter().map(OrderItem::total_price).sum();
        Self {
            id: OrderId::new(),
            order_type,
            status: order_type.initial_status(),
            customer_id,
            items,
            total_amount,
            discount,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut [OrderItem] {
        &mut self.items
    }

    /// Replaces the item with the same id, keeping the order of items.
    ///
    /// Returns false if no item with that id belongs to this order.
    pub(crate) fn refresh_item(&mut self, item: OrderItem) -> bool {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub fn item(&self, id: ItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    /// Amount charged once the discount is applied.
    pub fn net_amount(&self) -> Money {
        self.total_amount - self.discount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True when every item draws from an existing variant and is fully
    /// reserved, so nothing has to be manufactured.
    pub fn has_full_stock_coverage(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|i| !i.needs_new_variant() && i.is_fully_reserved())
    }

    /// Total units still waiting on manufacturing.
    pub fn total_shortfall(&self) -> u32 {
        self.items.iter().map(OrderItem::shortfall).sum()
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus) {
        debug_assert!(self.order_type.allows(status));
        self.status = status;
    }
}
