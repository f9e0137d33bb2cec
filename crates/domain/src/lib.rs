//! Domain layer for the order lifecycle engine.
//!
//! This crate provides:
//! - Order, item, catalog and record entities
//! - Order events and their typed payloads
//! - Persistence and publishing ports, with an in-memory implementation
//! - Per-order-type state machines and the lifecycle driver

pub mod catalog;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod memory;
pub mod order;
pub mod ports;
pub mod records;

pub use catalog::{Product, ProductFilter, ProductVariant};
pub use error::DomainError;
pub use events::{EventKind, EventPayload, OrderEvent};
pub use lifecycle::{
    LifecycleError, OrderLifecycle, OrderState, OrderStrategy, StateDeps,
};
pub use memory::InMemoryStore;
pub use order::{Order, OrderItem, OrderStatus, OrderType};
pub use ports::{
    AuditRepository, CustomerRepository, EventPublisher, FinancialRepository, NoopPublisher,
    OrderItemRepository, ProductRepository, RepoResult, RepositoryError, VariantRepository,
};
pub use records::{
    AuditLog, Customer, CustomerTransaction, CustomerTransactionKind, FinancialTransaction,
    FinancialTransactionKind,
};
