//! Product variants and the stock arithmetic that guards them.

use common::{Money, ProductId, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A stock-keeping unit: one color/size combination of a product.
///
/// Invariant: `0 <= reserved_stock <= stock`. Every mutator below either
/// keeps the invariant or returns an error without changing anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
    pub unit_price: Money,
    stock: u32,
    reserved_stock: u32,
    pub active: bool,
}

impl ProductVariant {
    /// Creates an active variant with the given physical stock and nothing reserved.
    pub fn new(
        product_id: ProductId,
        color: impl Into<String>,
        size: impl Into<String>,
        unit_price: Money,
        stock: u32,
    ) -> Self {
        Self {
            id: VariantId::new(),
            product_id,
            color: color.into(),
            size: size.into(),
            unit_price,
            stock,
            reserved_stock: 0,
            active: true,
        }
    }

    /// Rebuilds a variant from persisted counters.
    ///
    /// Fails if the counters break the stock invariant.
    pub fn restore(mut self, stock: u32, reserved_stock: u32) -> Result<Self, DomainError> {
        if reserved_stock > stock {
            return Err(DomainError::StockInvariant {
                variant_id: self.id,
                stock,
                reserved: reserved_stock,
                delta: 0,
            });
        }
        self.stock = stock;
        self.reserved_stock = reserved_stock;
        Ok(self)
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn reserved_stock(&self) -> u32 {
        self.reserved_stock
    }

    /// Units on hand that are not earmarked for any order.
    pub fn available(&self) -> u32 {
        self.stock - self.reserved_stock
    }

    /// True when `quantity` units can be reserved right now.
    pub fn can_reserve(&self, quantity: u32) -> bool {
        quantity <= self.available()
    }

    /// How many of `quantity` units could be reserved right now.
    pub fn reservable(&self, quantity: u32) -> u32 {
        quantity.min(self.available())
    }

    /// Earmarks `quantity` units of available stock.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), DomainError> {
        if !self.can_reserve(quantity) {
            return Err(DomainError::InsufficientStock {
                variant_id: self.id,
                requested: quantity,
                available: self.available(),
            });
        }
        self.reserved_stock += quantity;
        Ok(())
    }

    /// Removes up to `quantity` units from the reservation, leaving physical
    /// stock untouched. Clamped at zero; returns the units actually released.
    pub fn unreserve(&mut self, quantity: u32) -> u32 {
        let released = quantity.min(self.reserved_stock);
        self.reserved_stock -= released;
        released
    }

    /// Consumes `quantity` reserved units: both stock and reserved stock drop.
    pub fn consume(&mut self, quantity: u32) -> Result<(), DomainError> {
        if quantity > self.reserved_stock {
            return Err(DomainError::StockInvariant {
                variant_id: self.id,
                stock: self.stock,
                reserved: self.reserved_stock,
                delta: -i64::from(quantity),
            });
        }
        self.stock -= quantity;
        self.reserved_stock -= quantity;
        Ok(())
    }

    /// Adds (or, when negative, removes) physical stock.
    ///
    /// Removing stock may never dip into reserved units.
    pub fn adjust_stock(&mut self, delta: i64) -> Result<(), DomainError> {
        let next = i64::from(self.stock) + delta;
        let violation = DomainError::StockInvariant {
            variant_id: self.id,
            stock: self.stock,
            reserved: self.reserved_stock,
            delta,
        };
        if next < i64::from(self.reserved_stock) {
            return Err(violation);
        }
        self.stock = u32::try_from(next).map_err(|_| violation)?;
        Ok(())
    }

    /// Marks the variant inactive. Variants are never deleted.
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
