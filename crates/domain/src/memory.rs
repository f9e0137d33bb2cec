//! In-memory implementation of every persistence port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId, VariantId};
use tokio::sync::RwLock;

use crate::catalog::{Product, ProductFilter, ProductVariant};
use crate::order::{Order, OrderItem};
use crate::ports::{
    AuditRepository, CustomerRepository, FinancialRepository, OrderItemRepository,
    ProductRepository, RepoResult, RepositoryError, VariantRepository,
};
use crate::records::{AuditLog, Customer, CustomerTransaction, FinancialTransaction};

/// In-memory store for tests and single-process runs.
///
/// Each stock method takes the variant map's write lock for the whole
/// read-modify-write, so adjustments of the same variant never interleave.
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    variants: Arc<RwLock<HashMap<VariantId, ProductVariant>>>,
    products: Arc<RwLock<Vec<Product>>>,
    order_items: Arc<RwLock<HashMap<OrderId, Vec<OrderItem>>>>,
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
    audit_logs: Arc<RwLock<Vec<AuditLog>>>,
    financial_transactions: Arc<RwLock<Vec<FinancialTransaction>>>,
    customer_transactions: Arc<RwLock<Vec<CustomerTransaction>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a customer.
    pub async fn insert_customer(&self, customer: Customer) {
        self.customers.write().await.insert(customer.id, customer);
    }

    /// Stores every item of `order`, replacing any previously stored items.
    pub async fn save_order_items(&self, order: &Order) {
        self.order_items
            .write()
            .await
            .insert(order.id(), order.items().to_vec());
    }

    /// Returns a copy of the variant, if present.
    pub async fn variant(&self, id: VariantId) -> Option<ProductVariant> {
        self.variants.read().await.get(&id).cloned()
    }

    /// Returns all stored variants.
    pub async fn variants(&self) -> Vec<ProductVariant> {
        self.variants.read().await.values().cloned().collect()
    }

    pub async fn products(&self) -> Vec<Product> {
        self.products.read().await.clone()
    }

    pub async fn audit_logs(&self) -> Vec<AuditLog> {
        self.audit_logs.read().await.clone()
    }

    pub async fn financial_transactions(&self) -> Vec<FinancialTransaction> {
        self.financial_transactions.read().await.clone()
    }

    pub async fn customer_transactions(&self) -> Vec<CustomerTransaction> {
        self.customer_transactions.read().await.clone()
    }

    /// Applies `f` to one variant under the write lock.
    async fn modify_variant<T>(
        &self,
        id: VariantId,
        f: impl FnOnce(&mut ProductVariant) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut variants = self.variants.write().await;
        let variant = variants
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::variant_not_found(id))?;
        // Work on a copy so a failed change leaves the stored variant intact.
        let mut working = variant.clone();
        let result = f(&mut working)?;
        *variant = working;
        Ok(result)
    }
}

#[async_trait]
impl VariantRepository for InMemoryStore {
    async fn get_variant(&self, id: VariantId) -> RepoResult<Option<ProductVariant>> {
        Ok(self.variants.read().await.get(&id).cloned())
    }

    async fn create_variant(&self, variant: ProductVariant) -> RepoResult<ProductVariant> {
        self.variants
            .write()
            .await
            .insert(variant.id, variant.clone());
        Ok(variant)
    }

    async fn update_variant(&self, variant: &ProductVariant) -> RepoResult<()> {
        self.modify_variant(variant.id, |stored| {
            stored.color = variant.color.clone();
            stored.size = variant.size.clone();
            stored.unit_price = variant.unit_price;
            stored.active = variant.active;
            Ok(())
        })
        .await
    }

    async fn adjust_stock(&self, id: VariantId, delta: i64) -> RepoResult<ProductVariant> {
        self.modify_variant(id, |v| {
            v.adjust_stock(delta)?;
            Ok(v.clone())
        })
        .await
    }

    async fn restock(
        &self,
        id: VariantId,
        produced: u32,
        reserve: bool,
    ) -> RepoResult<ProductVariant> {
        self.modify_variant(id, |v| {
            v.adjust_stock(i64::from(produced))?;
            if reserve {
                v.reserve(produced)?;
            }
            Ok(v.clone())
        })
        .await
    }

    async fn reserve_stock(&self, id: VariantId, quantity: u32) -> RepoResult<ProductVariant> {
        self.modify_variant(id, |v| {
            v.reserve(quantity)?;
            Ok(v.clone())
        })
        .await
    }

    async fn unreserve_stock(&self, id: VariantId, quantity: u32) -> RepoResult<u32> {
        self.modify_variant(id, |v| Ok(v.unreserve(quantity))).await
    }

    async fn release_stock(&self, id: VariantId, quantity: u32) -> RepoResult<ProductVariant> {
        self.modify_variant(id, |v| {
            v.consume(quantity)?;
            Ok(v.clone())
        })
        .await
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn create_product(&self, product: Product) -> RepoResult<Product> {
        self.products.write().await.push(product.clone());
        Ok(product)
    }

    async fn list_products(&self, filter: &ProductFilter) -> RepoResult<Vec<Product>> {
        Ok(self
            .products
            .read()
            .await
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn list_variants(&self, product_id: ProductId) -> RepoResult<Vec<ProductVariant>> {
        Ok(self
            .variants
            .read()
            .await
            .values()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderItemRepository for InMemoryStore {
    async fn create_order_item(&self, order_id: OrderId, item: &OrderItem) -> RepoResult<()> {
        let mut orders = self.order_items.write().await;
        let items = orders.entry(order_id).or_default();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }

    async fn get_order_items_by_order(&self, order_id: OrderId) -> RepoResult<Vec<OrderItem>> {
        Ok(self
            .order_items
            .read()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_order_item(&self, order_id: OrderId, item: &OrderItem) -> RepoResult<()> {
        let mut items = self.order_items.write().await;
        let slot = items
            .get_mut(&order_id)
            .and_then(|items| items.iter_mut().find(|i| i.id == item.id))
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "order item",
                id: item.id.to_string(),
            })?;
        *slot = item.clone();
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn get_customer(&self, id: CustomerId) -> RepoResult<Option<Customer>> {
        Ok(self.customers.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn create_audit_log(&self, entry: AuditLog) -> RepoResult<()> {
        self.audit_logs.write().await.push(entry);
        Ok(())
    }
}

#[async_trait]
impl FinancialRepository for InMemoryStore {
    async fn create_financial_transaction(&self, tx: FinancialTransaction) -> RepoResult<()> {
        self.financial_transactions.write().await.push(tx);
        Ok(())
    }

    async fn create_customer_transaction(&self, tx: CustomerTransaction) -> RepoResult<()> {
        self.customer_transactions.write().await.push(tx);
        Ok(())
    }
}
