//! Ports the lifecycle engine and its consumers depend on.
//!
//! Persistence lives behind these traits. [`InMemoryStore`](crate::InMemoryStore)
//! implements all of them for tests and single-process runs; the `store`
//! crate provides a PostgreSQL implementation.
//!
//! Every stock method is one indivisible adjustment of one variant.
//! Implementations must not let two calls on the same variant interleave.

use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId, VariantId};
use thiserror::Error;

use crate::catalog::{Product, ProductFilter, ProductVariant};
use crate::error::DomainError;
use crate::events::OrderEvent;
use crate::order::OrderItem;
use crate::records::{AuditLog, Customer, CustomerTransaction, FinancialTransaction};

/// Errors returned by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The change would break a stock invariant.
    #[error(transparent)]
    Stock(#[from] DomainError),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    pub fn variant_not_found(id: VariantId) -> Self {
        RepositoryError::NotFound {
            entity: "variant",
            id: id.to_string(),
        }
    }

    /// True when the error means "the record is missing".
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Stock-keeping units and their counters.
#[async_trait]
pub trait VariantRepository: Send + Sync {
    async fn get_variant(&self, id: VariantId) -> RepoResult<Option<ProductVariant>>;

    async fn create_variant(&self, variant: ProductVariant) -> RepoResult<ProductVariant>;

    /// Overwrites descriptive fields (color, size, price, active flag).
    /// Stock counters are left to the dedicated methods below.
    async fn update_variant(&self, variant: &ProductVariant) -> RepoResult<()>;

    /// Adds `delta` to physical stock (negative removes).
    async fn adjust_stock(&self, id: VariantId, delta: i64) -> RepoResult<ProductVariant>;

    /// Adds `produced` units to physical stock and, when `reserve` is set,
    /// earmarks the same units, as one indivisible change.
    async fn restock(
        &self,
        id: VariantId,
        produced: u32,
        reserve: bool,
    ) -> RepoResult<ProductVariant>;

    /// Earmarks `quantity` units; fails with insufficient stock otherwise.
    async fn reserve_stock(&self, id: VariantId, quantity: u32) -> RepoResult<ProductVariant>;

    /// Un-earmarks up to `quantity` units without touching physical stock.
    /// Returns the units actually released.
    async fn unreserve_stock(&self, id: VariantId, quantity: u32) -> RepoResult<u32>;

    /// Consumes `quantity` reserved units: stock and reserved stock both drop.
    async fn release_stock(&self, id: VariantId, quantity: u32) -> RepoResult<ProductVariant>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create_product(&self, product: Product) -> RepoResult<Product>;

    async fn list_products(&self, filter: &ProductFilter) -> RepoResult<Vec<Product>>;

    /// Variants of `product_id`, used to find an existing color/size match.
    async fn list_variants(&self, product_id: ProductId) -> RepoResult<Vec<ProductVariant>>;
}

#[async_trait]
pub trait OrderItemRepository: Send + Sync {
    /// Stores an item of an order, replacing a stored item with the same id.
    async fn create_order_item(&self, order_id: OrderId, item: &OrderItem) -> RepoResult<()>;

    async fn get_order_items_by_order(&self, order_id: OrderId) -> RepoResult<Vec<OrderItem>>;

    async fn update_order_item(&self, order_id: OrderId, item: &OrderItem) -> RepoResult<()>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get_customer(&self, id: CustomerId) -> RepoResult<Option<Customer>>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn create_audit_log(&self, entry: AuditLog) -> RepoResult<()>;
}

#[async_trait]
pub trait FinancialRepository: Send + Sync {
    async fn create_financial_transaction(&self, tx: FinancialTransaction) -> RepoResult<()>;

    async fn create_customer_transaction(&self, tx: CustomerTransaction) -> RepoResult<()>;
}

/// Outbound side of the event bus as seen by state entry actions.
///
/// Publishing never blocks and never fails; delivery is best-effort.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: OrderEvent);
}

/// Publisher that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: OrderEvent) {}
}
