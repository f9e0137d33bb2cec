//! Order line items.

use common::{ItemId, Money, VariantId};
use serde::{Deserialize, Serialize};

/// One line of an order.
///
/// `reserved_quantity` counts units of this line currently held against the
/// variant's reserved stock. It starts at zero and only the reservation
/// protocol changes it; it never exceeds `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub product_name: String,
    pub color: String,
    pub size: String,
    pub category: Option<String>,
    /// Quantity requested by the order.
    pub quantity: u32,
    reserved_quantity: u32,
    pub unit_price: Money,
    /// The stock-keeping unit this line draws from.
    ///
    /// `None` means no matching variant exists yet; one is created when the
    /// order is manufactured.
    pub variant_id: Option<VariantId>,
}

impl OrderItem {
    /// Creates a new item that does not reference an existing variant.
    pub fn new(
        product_name: impl Into<String>,
        color: impl Into<String>,
        size: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            id: ItemId::new(),
            product_name: product_name.into(),
            color: color.into(),
            size: size.into(),
            category: None,
            quantity,
            reserved_quantity: 0,
            unit_price,
            variant_id: None,
        }
    }

    /// Links this item to an existing variant.
    pub fn with_variant(mut self, variant_id: VariantId) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    /// Sets the category reference.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restores a persisted reservation count, capped at the requested quantity.
    pub fn with_reserved_quantity(mut self, reserved: u32) -> Self {
        self.reserved_quantity = reserved.min(self.quantity);
        self
    }

    /// Units currently reserved for this item.
    pub fn reserved_quantity(&self) -> u32 {
        self.reserved_quantity
    }

    /// Units still not covered by a reservation.
    pub fn shortfall(&self) -> u32 {
        self.quantity - self.reserved_quantity
    }

    /// True when every requested unit is reserved.
    pub fn is_fully_reserved(&self) -> bool {
        self.reserved_quantity == self.quantity
    }

    /// True when no variant exists yet for this item.
    pub fn needs_new_variant(&self) -> bool {
        self.variant_id.is_none()
    }

    /// Records `units` more reserved units, capped at the requested quantity.
    ///
    /// Returns the number of units actually recorded.
    pub fn add_reserved(&mut self, units: u32) -> u32 {
        let added = units.min(self.shortfall());
        self.reserved_quantity += added;
        added
    }

    /// Clears the reservation, returning how many units were held.
    pub fn clear_reserved(&mut self) -> u32 {
        std::mem::take(&mut self.reserved_quantity)
    }

    /// Returns the total price for this item (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}
