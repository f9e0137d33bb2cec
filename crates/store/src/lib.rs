//! PostgreSQL persistence for the order lifecycle engine.
//!
//! [`PostgresStore`] implements every repository port of the `domain` crate.
//! Stock changes are single guarded `UPDATE` statements, so concurrent
//! reservations of one variant can never oversell it.

pub mod error;
pub mod postgres;

pub use error::{Result, StoreError};
pub use postgres::PostgresStore;
