//! Products and their stock-keeping units.

mod product;
mod variant;

pub use product::{Product, ProductFilter};
pub use variant::ProductVariant;
