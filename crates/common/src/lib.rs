//! Shared types for the order lifecycle engine.
//!
//! Typed identifiers keep order, item, variant, product and customer ids
//! from being mixed up, and [`Money`] keeps amounts in integral cents.

mod ids;
mod money;

pub use ids::{CustomerId, ItemId, OrderId, ProductId, RecordId, VariantId};
pub use money::Money;
