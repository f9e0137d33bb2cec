//! Order types and the status vocabulary they share.

use serde::{Deserialize, Serialize};

/// The kind of commercial order. Fixed for the life of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Made to order for a customer.
    Custom,
    /// Produced for stock.
    Inventory,
    /// Sold from existing stock.
    Sale,
}

impl OrderType {
    /// All order types.
    pub const ALL: [OrderType; 3] = [OrderType::Custom, OrderType::Inventory, OrderType::Sale];

    /// Returns the status every new order of this type starts in.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            OrderType::Custom => OrderStatus::Quote,
            OrderType::Inventory => OrderStatus::Planned,
            OrderType::Sale => OrderStatus::Pending,
        }
    }

    /// Returns the statuses legal for this order type.
    pub fn statuses(&self) -> &'static [OrderStatus] {
        match self {
            OrderType::Custom => &[
                OrderStatus::Quote,
                OrderStatus::Approved,
                OrderStatus::Manufacturing,
                OrderStatus::Finished,
                OrderStatus::Delivered,
                OrderStatus::Cancelled,
            ],
            OrderType::Inventory => &[
                OrderStatus::Planned,
                OrderStatus::Manufacturing,
                OrderStatus::Finished,
                OrderStatus::Cancelled,
            ],
            OrderType::Sale => &[
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Delivered,
                OrderStatus::Cancelled,
            ],
        }
    }

    /// Returns true if `status` belongs to this type's status set.
    pub fn allows(&self, status: OrderStatus) -> bool {
        self.statuses().contains(&status)
    }

    /// Returns the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Custom => "custom",
            OrderType::Inventory => "inventory",
            OrderType::Sale => "sale",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of an order.
///
/// Status graphs per order type:
/// ```text
/// Custom:    Quote ──► Approved ──► Manufacturing ──► Finished ──► Delivered
///                         └──────(full coverage)────────►┘
/// Inventory: Planned ──► Manufacturing ──► Finished
/// Sale:      Pending ──► Confirmed ──► Delivered
///
/// Every non-terminal status may also move to Cancelled.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Quote,
    Approved,
    Manufacturing,
    Finished,
    Delivered,
    Cancelled,
    Planned,
    Pending,
    Confirmed,
}

impl OrderStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Quote => "quote",
            OrderStatus::Approved => "approved",
            OrderStatus::Manufacturing => "manufacturing",
            OrderStatus::Finished => "finished",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Planned => "planned",
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
