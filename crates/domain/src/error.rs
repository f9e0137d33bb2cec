//! Domain error types.

use common::VariantId;
use thiserror::Error;

/// Entity-level invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Not enough unreserved stock to satisfy a reservation.
    #[error(
        "Insufficient stock for variant {variant_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// A stock change would leave physical stock below reserved stock.
    #[error(
        "Stock invariant violated for variant {variant_id}: stock {stock}, reserved {reserved}, change {delta}"
    )]
    StockInvariant {
        variant_id: VariantId,
        stock: u32,
        reserved: u32,
        delta: i64,
    },
}
