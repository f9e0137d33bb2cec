use async_trait::async_trait;
use common::{CustomerId, ItemId, Money, OrderId, ProductId, RecordId, VariantId};
use domain::{
    AuditLog, AuditRepository, Customer, CustomerRepository, CustomerTransaction, DomainError,
    FinancialRepository, FinancialTransaction, OrderItem, OrderItemRepository, OrderStatus,
    Product, ProductFilter, ProductRepository, ProductVariant, RepoResult, RepositoryError,
    VariantRepository,
};
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Result, StoreError};

/// PostgreSQL-backed implementation of every repository port.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a small pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Stores a customer, replacing one with the same id.
    pub async fn create_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, is_internal)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, is_internal = EXCLUDED.is_internal
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(customer.is_internal)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Audit entries of one order, oldest first.
    pub async fn audit_logs_for_order(&self, order_id: OrderId) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, event_kind, from_status, to_status, detail, recorded_at
            FROM audit_logs
            WHERE order_id = $1
            ORDER BY recorded_at
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AuditLog> {
                Ok(AuditLog {
                    id: RecordId::from_uuid(row.try_get("id")?),
                    order_id: OrderId::from_uuid(row.try_get("order_id")?),
                    event_kind: parse_name("audit log", row.try_get("event_kind")?)?,
                    from_status: parse_optional_name("audit log", row.try_get("from_status")?)?,
                    to_status: parse_optional_name("audit log", row.try_get("to_status")?)?,
                    detail: row.try_get("detail")?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    /// Sum of income recorded for one order.
    pub async fn income_for_order(&self, order_id: OrderId) -> Result<Money> {
        let cents: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(amount_cents)::BIGINT FROM financial_transactions WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(cents.unwrap_or(0)))
    }

    /// Sum of debt recorded against one customer.
    pub async fn debt_for_customer(&self, customer_id: CustomerId) -> Result<Money> {
        let cents: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(amount_cents)::BIGINT FROM customer_transactions WHERE customer_id = $1",
        )
        .bind(customer_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(cents.unwrap_or(0)))
    }

    async fn fetch_variant(&self, id: VariantId) -> Result<Option<ProductVariant>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, color, size, unit_price_cents, stock, reserved_stock, active
            FROM product_variants
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(variant_from_row).transpose()
    }

    /// Explains why a guarded stock update matched no row.
    async fn stock_failure(
        &self,
        id: VariantId,
        violation: impl FnOnce(&ProductVariant) -> DomainError,
    ) -> RepositoryError {
        match self.fetch_variant(id).await {
            Ok(Some(variant)) => violation(&variant).into(),
            Ok(None) => RepositoryError::variant_not_found(id),
            Err(e) => e.into(),
        }
    }
}

fn db(e: sqlx::Error) -> RepositoryError {
    StoreError::from(e).into()
}

fn row_error(e: StoreError) -> RepositoryError {
    e.into()
}

fn count(row: &PgRow, column: &'static str, entity: &'static str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::corrupt(entity, format!("{column} = {value}")))
}

/// Parses a value stored under its serde name.
fn parse_name<T: DeserializeOwned>(entity: &'static str, name: String) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(name))
        .map_err(|e| StoreError::corrupt(entity, e))
}

fn parse_optional_name<T: DeserializeOwned>(
    entity: &'static str,
    name: Option<String>,
) -> Result<Option<T>> {
    name.map(|n| parse_name(entity, n)).transpose()
}

fn variant_from_row(row: &PgRow) -> Result<ProductVariant> {
    let mut variant = ProductVariant::new(
        ProductId::from_uuid(row.try_get("product_id")?),
        row.try_get::<String, _>("color")?,
        row.try_get::<String, _>("size")?,
        Money::from_cents(row.try_get("unit_price_cents")?),
        0,
    );
    variant.id = VariantId::from_uuid(row.try_get("id")?);
    variant.active = row.try_get("active")?;
    variant
        .restore(
            count(row, "stock", "variant")?,
            count(row, "reserved_stock", "variant")?,
        )
        .map_err(|e| StoreError::corrupt("variant", e))
}

fn item_from_row(row: &PgRow) -> Result<OrderItem> {
    let mut item = OrderItem::new(
        row.try_get::<String, _>("product_name")?,
        row.try_get::<String, _>("color")?,
        row.try_get::<String, _>("size")?,
        count(row, "quantity", "order item")?,
        Money::from_cents(row.try_get("unit_price_cents")?),
    )
    .with_reserved_quantity(count(row, "reserved_quantity", "order item")?);
    item.id = ItemId::from_uuid(row.try_get("id")?);
    item.category = row.try_get("category")?;
    item.variant_id = row
        .try_get::<Option<Uuid>, _>("variant_id")?
        .map(VariantId::from_uuid);
    Ok(item)
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        active: row.try_get("active")?,
    })
}

#[async_trait]
impl VariantRepository for PostgresStore {
    async fn get_variant(&self, id: VariantId) -> RepoResult<Option<ProductVariant>> {
        Ok(self.fetch_variant(id).await?)
    }

    async fn create_variant(&self, variant: ProductVariant) -> RepoResult<ProductVariant> {
        sqlx::query(
            r#"
            INSERT INTO product_variants
                (id, product_id, color, size, unit_price_cents, stock, reserved_stock, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(variant.id.as_uuid())
        .bind(variant.product_id.as_uuid())
        .bind(&variant.color)
        .bind(&variant.size)
        .bind(variant.unit_price.cents())
        .bind(i64::from(variant.stock()))
        .bind(i64::from(variant.reserved_stock()))
        .bind(variant.active)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        tracing::debug!(variant_id = %variant.id, stock = variant.stock(), "variant created");
        Ok(variant)
    }

    async fn update_variant(&self, variant: &ProductVariant) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE product_variants
            SET color = $2, size = $3, unit_price_cents = $4, active = $5
            WHERE id = $1
            "#,
        )
        .bind(variant.id.as_uuid())
        .bind(&variant.color)
        .bind(&variant.size)
        .bind(variant.unit_price.cents())
        .bind(variant.active)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::variant_not_found(variant.id));
        }
        Ok(())
    }

    async fn adjust_stock(&self, id: VariantId, delta: i64) -> RepoResult<ProductVariant> {
        let row = sqlx::query(
            r#"
            UPDATE product_variants
            SET stock = stock + $2
            WHERE id = $1 AND stock + $2 >= reserved_stock AND stock + $2 <= 4294967295
            RETURNING id, product_id, color, size, unit_price_cents, stock, reserved_stock, active
            "#,
        )
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => variant_from_row(&row).map_err(row_error),
            None => Err(self
                .stock_failure(id, |v| DomainError::StockInvariant {
                    variant_id: id,
                    stock: v.stock(),
                    reserved: v.reserved_stock(),
                    delta,
                })
                .await),
        }
    }

    async fn restock(
        &self,
        id: VariantId,
        produced: u32,
        reserve: bool,
    ) -> RepoResult<ProductVariant> {
        let reserved = if reserve { produced } else { 0 };
        let row = sqlx::query(
            r#"
            UPDATE product_variants
            SET stock = stock + $2, reserved_stock = reserved_stock + $3
            WHERE id = $1 AND stock + $2 <= 4294967295
            RETURNING id, product_id, color, size, unit_price_cents, stock, reserved_stock, active
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(produced))
        .bind(i64::from(reserved))
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => variant_from_row(&row).map_err(row_error),
            None => Err(self
                .stock_failure(id, |v| DomainError::StockInvariant {
                    variant_id: id,
                    stock: v.stock(),
                    reserved: v.reserved_stock(),
                    delta: i64::from(produced),
                })
                .await),
        }
    }

    async fn reserve_stock(&self, id: VariantId, quantity: u32) -> RepoResult<ProductVariant> {
        let row = sqlx::query(
            r#"
            UPDATE product_variants
            SET reserved_stock = reserved_stock + $2
            WHERE id = $1 AND stock - reserved_stock >= $2
            RETURNING id, product_id, color, size, unit_price_cents, stock, reserved_stock, active
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => variant_from_row(&row).map_err(row_error),
            None => Err(self
                .stock_failure(id, |v| DomainError::InsufficientStock {
                    variant_id: id,
                    requested: quantity,
                    available: v.available(),
                })
                .await),
        }
    }

    async fn unreserve_stock(&self, id: VariantId, quantity: u32) -> RepoResult<u32> {
        let released: Option<i64> = sqlx::query_scalar(
            r#"
            WITH old AS (
                SELECT id, reserved_stock FROM product_variants WHERE id = $1 FOR UPDATE
            )
            UPDATE product_variants v
            SET reserved_stock = GREATEST(v.reserved_stock - $2, 0)
            FROM old
            WHERE v.id = old.id
            RETURNING old.reserved_stock - v.reserved_stock
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        let released = released.ok_or_else(|| RepositoryError::variant_not_found(id))?;
        u32::try_from(released)
            .map_err(|_| StoreError::corrupt("variant", format!("released {released}")).into())
    }

    async fn release_stock(&self, id: VariantId, quantity: u32) -> RepoResult<ProductVariant> {
        let row = sqlx::query(
            r#"
            UPDATE product_variants
            SET stock = stock - $2, reserved_stock = reserved_stock - $2
            WHERE id = $1 AND reserved_stock >= $2
            RETURNING id, product_id, color, size, unit_price_cents, stock, reserved_stock, active
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => variant_from_row(&row).map_err(row_error),
            None => Err(self
                .stock_failure(id, |v| DomainError::StockInvariant {
                    variant_id: id,
                    stock: v.stock(),
                    reserved: v.reserved_stock(),
                    delta: -i64::from(quantity),
                })
                .await),
        }
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn create_product(&self, product: Product) -> RepoResult<Product> {
        sqlx::query("INSERT INTO products (id, name, category, active) VALUES ($1, $2, $3, $4)")
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(&product.category)
            .bind(product.active)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(product)
    }

    async fn list_products(&self, filter: &ProductFilter) -> RepoResult<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, category, active
            FROM products
            WHERE ($1::TEXT IS NULL OR LOWER(name) = LOWER($1))
              AND ($2::TEXT IS NULL OR category = $2)
              AND (NOT $3 OR active)
            ORDER BY created_at, id
            "#,
        )
        .bind(&filter.name)
        .bind(&filter.category)
        .bind(filter.active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|row| product_from_row(row).map_err(row_error))
            .collect()
    }

    async fn list_variants(&self, product_id: ProductId) -> RepoResult<Vec<ProductVariant>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, color, size, unit_price_cents, stock, reserved_stock, active
            FROM product_variants
            WHERE product_id = $1
            ORDER BY color, size
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|row| variant_from_row(row).map_err(row_error))
            .collect()
    }
}

#[async_trait]
impl OrderItemRepository for PostgresStore {
    async fn create_order_item(&self, order_id: OrderId, item: &OrderItem) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items
                (id, order_id, product_name, color, size, category, quantity,
                 reserved_quantity, unit_price_cents, variant_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                product_name = EXCLUDED.product_name,
                color = EXCLUDED.color,
                size = EXCLUDED.size,
                category = EXCLUDED.category,
                quantity = EXCLUDED.quantity,
                reserved_quantity = EXCLUDED.reserved_quantity,
                unit_price_cents = EXCLUDED.unit_price_cents,
                variant_id = EXCLUDED.variant_id
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(&item.product_name)
        .bind(&item.color)
        .bind(&item.size)
        .bind(&item.category)
        .bind(i64::from(item.quantity))
        .bind(i64::from(item.reserved_quantity()))
        .bind(item.unit_price.cents())
        .bind(item.variant_id.map(|v| v.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_order_items_by_order(&self, order_id: OrderId) -> RepoResult<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_name, color, size, category, quantity, reserved_quantity,
                   unit_price_cents, variant_id
            FROM order_items
            WHERE order_id = $1
            ORDER BY seq
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|row| item_from_row(row).map_err(row_error))
            .collect()
    }

    async fn update_order_item(&self, order_id: OrderId, item: &OrderItem) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_items
            SET product_name = $3, color = $4, size = $5, category = $6, quantity = $7,
                reserved_quantity = $8, unit_price_cents = $9, variant_id = $10
            WHERE id = $1 AND order_id = $2
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(&item.product_name)
        .bind(&item.color)
        .bind(&item.size)
        .bind(&item.category)
        .bind(i64::from(item.quantity))
        .bind(i64::from(item.reserved_quantity()))
        .bind(item.unit_price.cents())
        .bind(item.variant_id.map(|v| v.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity: "order item",
                id: item.id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for PostgresStore {
    async fn get_customer(&self, id: CustomerId) -> RepoResult<Option<Customer>> {
        let row = sqlx::query("SELECT id, name, is_internal FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.map(|row| -> Result<Customer> {
            Ok(Customer {
                id: CustomerId::from_uuid(row.try_get("id")?),
                name: row.try_get("name")?,
                is_internal: row.try_get("is_internal")?,
            })
        })
        .transpose()
        .map_err(row_error)
    }
}

#[async_trait]
impl AuditRepository for PostgresStore {
    async fn create_audit_log(&self, entry: AuditLog) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, order_id, event_kind, from_status, to_status, detail, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.order_id.as_uuid())
        .bind(entry.event_kind.as_str())
        .bind(entry.from_status.map(|s: OrderStatus| s.as_str()))
        .bind(entry.to_status.map(|s: OrderStatus| s.as_str()))
        .bind(&entry.detail)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }
}

#[async_trait]
impl FinancialRepository for PostgresStore {
    async fn create_financial_transaction(&self, tx: FinancialTransaction) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO financial_transactions (id, order_id, kind, amount_cents, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.order_id.as_uuid())
        .bind(tx.kind.as_str())
        .bind(tx.amount.cents())
        .bind(&tx.description)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn create_customer_transaction(&self, tx: CustomerTransaction) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_transactions
                (id, customer_id, order_id, kind, amount_cents, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.customer_id.as_uuid())
        .bind(tx.order_id.as_uuid())
        .bind(tx.kind.as_str())
        .bind(tx.amount.cents())
        .bind(&tx.description)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }
}
