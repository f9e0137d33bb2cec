//! Orders, their line items and the status vocabulary.

mod entity;
mod item;
mod status;

pub use entity::Order;
pub use item::OrderItem;
pub use status::{OrderStatus, OrderType};
