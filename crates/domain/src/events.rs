//! Order events fanned out to consumers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, ItemId, Money, OrderId, VariantId};
use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderItem, OrderStatus, OrderType};

/// Topic an event is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// Catch-all topic mirroring every published event.
    #[serde(rename = "order.status.changed")]
    StatusChanged,
    #[serde(rename = "order.approved")]
    OrderApproved,
    #[serde(rename = "order.manufacturing")]
    OrderManufacturing,
    #[serde(rename = "order.finished")]
    OrderFinished,
    #[serde(rename = "order.delivered")]
    OrderDelivered,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "inventory.planned")]
    InventoryPlanned,
    #[serde(rename = "inventory.manufacturing")]
    InventoryManufacturing,
    #[serde(rename = "inventory.finished")]
    InventoryFinished,
    #[serde(rename = "sale.pending")]
    SalePending,
    #[serde(rename = "sale.confirmed")]
    SaleConfirmed,
    #[serde(rename = "sale.delivered")]
    SaleDelivered,
    #[serde(rename = "product.creation.required")]
    ProductCreationRequired,
    #[serde(rename = "stock.updated")]
    StockUpdated,
    #[serde(rename = "stock.reserved")]
    StockReserved,
    #[serde(rename = "stock.released")]
    StockReleased,
    #[serde(rename = "sale.completed")]
    SaleCompleted,
    #[serde(rename = "internal.customer.sale.completed")]
    InternalCustomerSaleCompleted,
}

impl EventKind {
    /// Every topic except the generic one.
    pub const SPECIFIC: [EventKind; 17] = [
        EventKind::OrderApproved,
        EventKind::OrderManufacturing,
        EventKind::OrderFinished,
        EventKind::OrderDelivered,
        EventKind::OrderCancelled,
        EventKind::InventoryPlanned,
        EventKind::InventoryManufacturing,
        EventKind::InventoryFinished,
        EventKind::SalePending,
        EventKind::SaleConfirmed,
        EventKind::SaleDelivered,
        EventKind::ProductCreationRequired,
        EventKind::StockUpdated,
        EventKind::StockReserved,
        EventKind::StockReleased,
        EventKind::SaleCompleted,
        EventKind::InternalCustomerSaleCompleted,
    ];

    /// Returns the wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StatusChanged => "order.status.changed",
            EventKind::OrderApproved => "order.approved",
            EventKind::OrderManufacturing => "order.manufacturing",
            EventKind::OrderFinished => "order.finished",
            EventKind::OrderDelivered => "order.delivered",
            EventKind::OrderCancelled => "order.cancelled",
            EventKind::InventoryPlanned => "inventory.planned",
            EventKind::InventoryManufacturing => "inventory.manufacturing",
            EventKind::InventoryFinished => "inventory.finished",
            EventKind::SalePending => "sale.pending",
            EventKind::SaleConfirmed => "sale.confirmed",
            EventKind::SaleDelivered => "sale.delivered",
            EventKind::ProductCreationRequired => "product.creation.required",
            EventKind::StockUpdated => "stock.updated",
            EventKind::StockReserved => "stock.reserved",
            EventKind::StockReleased => "stock.released",
            EventKind::SaleCompleted => "sale.completed",
            EventKind::InternalCustomerSaleCompleted => "internal.customer.sale.completed",
        }
    }

    /// True for the catch-all topic.
    pub fn is_generic(&self) -> bool {
        matches!(self, EventKind::StatusChanged)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Auxiliary data carried by an event, one shape per family of kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    /// Plain status transitions carry nothing extra.
    None,

    /// Carried by `product.creation.required`.
    ProductCreation {
        order_type: OrderType,
        items: Vec<OrderItem>,
        /// Units to manufacture per item. Items absent from the map need none.
        produced: HashMap<ItemId, u32>,
    },

    /// Carried by `stock.updated`, `stock.reserved` and `stock.released`.
    Stock { variant_id: VariantId, quantity: u32 },

    /// Carried by `sale.completed` and `internal.customer.sale.completed`.
    Sale {
        customer_id: Option<CustomerId>,
        amount: Money,
    },
}

/// An immutable record of something that happened to an order.
///
/// Cloning is cheap: the order snapshot and payload are shared.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub kind: EventKind,
    pub order_id: OrderId,
    pub order: Option<Arc<Order>>,
    pub previous_status: Option<OrderStatus>,
    pub new_status: Option<OrderStatus>,
    pub payload: Arc<EventPayload>,
    pub timestamp: DateTime<Utc>,
}

impl OrderEvent {
    /// Creates an event for a status transition of `order`.
    pub fn transition(kind: EventKind, order: &Order, previous: Option<OrderStatus>) -> Self {
        Self {
            kind,
            order_id: order.id(),
            order: Some(Arc::new(order.clone())),
            previous_status: previous,
            new_status: Some(order.status()),
            payload: Arc::new(EventPayload::None),
            timestamp: Utc::now(),
        }
    }

    /// Creates a stock movement event. Stock events carry no status change.
    pub fn stock(kind: EventKind, order: &Order, variant_id: VariantId, quantity: u32) -> Self {
        Self {
            kind,
            order_id: order.id(),
            order: Some(Arc::new(order.clone())),
            previous_status: None,
            new_status: None,
            payload: Arc::new(EventPayload::Stock {
                variant_id,
                quantity,
            }),
            timestamp: Utc::now(),
        }
    }

    /// Creates a completed-sale event for `order`.
    pub fn sale_completed(order: &Order, internal_customer: bool) -> Self {
        let kind = if internal_customer {
            EventKind::InternalCustomerSaleCompleted
        } else {
            EventKind::SaleCompleted
        };
        Self {
            kind,
            order_id: order.id(),
            order: Some(Arc::new(order.clone())),
            previous_status: None,
            new_status: None,
            payload: Arc::new(EventPayload::Sale {
                customer_id: order.customer_id(),
                amount: order.net_amount(),
            }),
            timestamp: Utc::now(),
        }
    }

    /// Creates a `product.creation.required` event listing what to manufacture.
    pub fn product_creation(order: &Order, produced: HashMap<ItemId, u32>) -> Self {
        Self {
            kind: EventKind::ProductCreationRequired,
            order_id: order.id(),
            order: Some(Arc::new(order.clone())),
            previous_status: None,
            new_status: None,
            payload: Arc::new(EventPayload::ProductCreation {
                order_type: order.order_type(),
                items: order.items().to_vec(),
                produced,
            }),
            timestamp: Utc::now(),
        }
    }

    /// Creates a stock movement event caused by this event, sharing its
    /// order snapshot.
    pub fn stock_follow_up(&self, kind: EventKind, variant_id: VariantId, quantity: u32) -> Self {
        Self {
            kind,
            order_id: self.order_id,
            order: self.order.clone(),
            previous_status: None,
            new_status: None,
            payload: Arc::new(EventPayload::Stock {
                variant_id,
                quantity,
            }),
            timestamp: Utc::now(),
        }
    }

    /// Returns a shallow copy re-addressed to the generic topic.
    pub fn to_generic(&self) -> Self {
        Self {
            kind: EventKind::StatusChanged,
            ..self.clone()
        }
    }

    /// True when the event records a status change.
    pub fn is_transition(&self) -> bool {
        self.new_status.is_some()
    }

    /// The order type, taken from the snapshot or the payload.
    pub fn order_type(&self) -> Option<OrderType> {
        match (&self.order, self.payload.as_ref()) {
            (Some(order), _) => Some(order.order_type()),
            (None, EventPayload::ProductCreation { order_type, .. }) => Some(*order_type),
            _ => None,
        }
    }
}
