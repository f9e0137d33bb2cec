//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container. Every test works on freshly
//! generated ids, so they do not interfere with each other.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{CustomerId, Money, OrderId, ProductId, RecordId};
use domain::{
    AuditLog, AuditRepository, Customer, CustomerRepository, CustomerTransaction,
    CustomerTransactionKind, DomainError, EventKind, FinancialRepository, FinancialTransaction,
    FinancialTransactionKind, NoopPublisher, Order, OrderItem, OrderItemRepository, OrderLifecycle,
    OrderStatus, OrderType, Product, ProductFilter, ProductRepository, ProductVariant,
    RepositoryError, StateDeps, VariantRepository,
};
use store::PostgresStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let store = PostgresStore::connect(&connection_string, 1).await.unwrap();
            store.run_migrations().await.unwrap();
            store.pool().close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap()
}

async fn seed_variant(store: &PostgresStore, stock: u32) -> ProductVariant {
    let product = store
        .create_product(Product::new(
            format!("Parka {}", ProductId::new()),
            Some("outerwear".into()),
        ))
        .await
        .unwrap();
    store
        .create_variant(ProductVariant::new(
            product.id,
            "olive",
            "L",
            Money::from_cents(12000),
            stock,
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_variant_roundtrip() {
    let store = get_test_store().await;
    let variant = seed_variant(&store, 7).await;

    let loaded = store.get_variant(variant.id).await.unwrap().unwrap();
    assert_eq!(loaded, variant);

    let mut changed = loaded.clone();
    changed.color = "sand".into();
    changed.deactivate();
    store.update_variant(&changed).await.unwrap();

    let loaded = store.get_variant(variant.id).await.unwrap().unwrap();
    assert_eq!(loaded.color, "sand");
    assert!(!loaded.active);
    assert_eq!(loaded.stock(), 7);
}

#[tokio::test]
async fn test_reserve_is_guarded() {
    let store = get_test_store().await;
    let variant = seed_variant(&store, 3).await;

    let err = store.reserve_stock(variant.id, 5).await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Stock(DomainError::InsufficientStock {
            requested: 5,
            available: 3,
            ..
        })
    ));

    let reserved = store.reserve_stock(variant.id, 3).await.unwrap();
    assert_eq!(reserved.reserved_stock(), 3);
    assert_eq!(reserved.available(), 0);
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    let variant = seed_variant(&store, 10).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let id = variant.id;
        handles.push(tokio::spawn(
            async move { store.reserve_stock(id, 1).await },
        ));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 10);
    let loaded = store.get_variant(variant.id).await.unwrap().unwrap();
    assert_eq!(loaded.reserved_stock(), 10);
    assert_eq!(loaded.stock(), 10);
}

#[tokio::test]
async fn test_unreserve_release_and_adjust() {
    let store = get_test_store().await;
    let variant = seed_variant(&store, 10).await;
    store.reserve_stock(variant.id, 6).await.unwrap();

    assert_eq!(store.unreserve_stock(variant.id, 2).await.unwrap(), 2);
    // Clamped at what is reserved.
    assert_eq!(store.unreserve_stock(variant.id, 9).await.unwrap(), 4);

    store.reserve_stock(variant.id, 5).await.unwrap();
    let consumed = store.release_stock(variant.id, 5).await.unwrap();
    assert_eq!(consumed.stock(), 5);
    assert_eq!(consumed.reserved_stock(), 0);

    let err = store.release_stock(variant.id, 1).await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Stock(DomainError::StockInvariant { .. })
    ));

    store.reserve_stock(variant.id, 4).await.unwrap();
    let err = store.adjust_stock(variant.id, -2).await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Stock(DomainError::StockInvariant { delta: -2, .. })
    ));
    let adjusted = store.adjust_stock(variant.id, 15).await.unwrap();
    assert_eq!(adjusted.stock(), 20);
}

#[tokio::test]
async fn test_restock_reserves_in_the_same_update() {
    let store = get_test_store().await;
    let variant = seed_variant(&store, 0).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let id = variant.id;
        handles.push(tokio::spawn(
            async move { store.reserve_stock(id, 1).await },
        ));
    }
    let restocked = store.restock(variant.id, 8, true).await.unwrap();
    assert_eq!(restocked.stock(), 8);
    assert_eq!(restocked.reserved_stock(), 8);
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    let restocked = store.restock(variant.id, 2, false).await.unwrap();
    assert_eq!(restocked.stock(), 10);
    assert_eq!(restocked.reserved_stock(), 8);
}

#[tokio::test]
async fn test_missing_variant_is_not_found() {
    let store = get_test_store().await;
    let missing = ProductVariant::new(ProductId::new(), "x", "y", Money::zero(), 0);

    assert!(store.get_variant(missing.id).await.unwrap().is_none());
    assert!(store.reserve_stock(missing.id, 1).await.unwrap_err().is_not_found());
    assert!(store.unreserve_stock(missing.id, 1).await.unwrap_err().is_not_found());
    assert!(store.release_stock(missing.id, 1).await.unwrap_err().is_not_found());
    assert!(store.restock(missing.id, 1, true).await.unwrap_err().is_not_found());
    assert!(store.update_variant(&missing).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_order_items() {
    let store = get_test_store().await;
    let variant = seed_variant(&store, 5).await;
    let order_id = OrderId::new();

    let first = OrderItem::new("Parka", "olive", "L", 3, Money::from_cents(12000))
        .with_variant(variant.id)
        .with_category("outerwear");
    let second = OrderItem::new("Scarf", "red", "one", 1, Money::from_cents(2500));
    store.create_order_item(order_id, &first).await.unwrap();
    store.create_order_item(order_id, &second).await.unwrap();
    // Storing again replaces rather than duplicates.
    store.create_order_item(order_id, &first).await.unwrap();

    let mut updated = first.clone().with_reserved_quantity(2);
    updated.size = "XL".into();
    store.update_order_item(order_id, &updated).await.unwrap();

    let items = store.get_order_items_by_order(order_id).await.unwrap();
    assert_eq!(items, vec![updated, second]);

    let stranger = OrderItem::new("Hat", "grey", "M", 1, Money::zero());
    let err = store
        .update_order_item(order_id, &stranger)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_products_by_name() {
    let store = get_test_store().await;
    let name = format!("Beanie {}", ProductId::new());
    let product = store
        .create_product(Product::new(name.clone(), None))
        .await
        .unwrap();
    let mut retired = Product::new(name.clone(), None);
    retired.active = false;
    store.create_product(retired).await.unwrap();

    let found = store
        .list_products(&ProductFilter::by_name(name.to_uppercase()))
        .await
        .unwrap();
    assert_eq!(found, vec![product.clone()]);

    let all = store
        .list_products(&ProductFilter {
            name: Some(name),
            ..ProductFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let variant = store
        .create_variant(ProductVariant::new(
            product.id,
            "navy",
            "S",
            Money::from_cents(900),
            2,
        ))
        .await
        .unwrap();
    assert_eq!(store.list_variants(product.id).await.unwrap(), vec![variant]);
}

#[tokio::test]
async fn test_customers_and_records() {
    let store = get_test_store().await;
    let customer = Customer::new("Back office", true);
    store.create_customer(&customer).await.unwrap();

    assert_eq!(
        store.get_customer(customer.id).await.unwrap(),
        Some(customer.clone())
    );
    assert!(store.get_customer(CustomerId::new()).await.unwrap().is_none());

    let order_id = OrderId::new();
    let entry = AuditLog {
        id: RecordId::new(),
        order_id,
        event_kind: EventKind::SaleConfirmed,
        from_status: Some(OrderStatus::Pending),
        to_status: Some(OrderStatus::Confirmed),
        detail: "pending -> confirmed".into(),
        recorded_at: Utc::now(),
    };
    store.create_audit_log(entry.clone()).await.unwrap();
    let logs = store.audit_logs_for_order(order_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].event_kind, EventKind::SaleConfirmed);
    assert_eq!(logs[0].to_status, Some(OrderStatus::Confirmed));

    for cents in [1500, 2500] {
        store
            .create_financial_transaction(FinancialTransaction {
                id: RecordId::new(),
                order_id,
                kind: FinancialTransactionKind::Income,
                amount: Money::from_cents(cents),
                description: "sale".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    assert_eq!(
        store.income_for_order(order_id).await.unwrap(),
        Money::from_cents(4000)
    );

    store
        .create_customer_transaction(CustomerTransaction {
            id: RecordId::new(),
            customer_id: customer.id,
            order_id,
            kind: CustomerTransactionKind::Debt,
            amount: Money::from_cents(700),
            description: "internal sale".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(
        store.debt_for_customer(customer.id).await.unwrap(),
        Money::from_cents(700)
    );
}

#[tokio::test]
async fn test_sale_lifecycle_against_postgres() {
    let store = get_test_store().await;
    let variant = seed_variant(&store, 8).await;
    let lifecycle = OrderLifecycle::new(StateDeps::from_store(
        store.clone(),
        Arc::new(NoopPublisher),
    ));

    let mut order = Order::new(
        OrderType::Sale,
        None,
        vec![
            OrderItem::new("Parka", "olive", "L", 5, Money::from_cents(12000))
                .with_variant(variant.id),
        ],
        Money::zero(),
    );
    lifecycle.start(&mut order).await.unwrap();
    let stored = store.get_order_items_by_order(order.id()).await.unwrap();
    assert_eq!(stored[0].reserved_quantity(), 5);

    lifecycle
        .transition(&mut order, OrderStatus::Confirmed)
        .await
        .unwrap();
    lifecycle
        .transition(&mut order, OrderStatus::Delivered)
        .await
        .unwrap();

    let loaded = store.get_variant(variant.id).await.unwrap().unwrap();
    assert_eq!(loaded.stock(), 3);
    assert_eq!(loaded.reserved_stock(), 0);
}
