//! Orders driven through the lifecycle with every consumer attached to a
//! live bus.

use std::sync::Arc;
use std::time::Duration;

use common::{Money, OrderId, ProductId};
use consumers::{AuditTrail, FinancialPosting, InventoryConsumer, MetricsAggregator};
use domain::{
    Customer, CustomerTransactionKind, EventKind, FinancialTransactionKind, InMemoryStore, Order,
    OrderItem, OrderItemRepository, OrderLifecycle, OrderStatus, OrderType, ProductVariant,
    StateDeps, VariantRepository,
};
use event_bus::{DEFAULT_INBOX_CAPACITY, EventBus, SubscriberHandle, spawn_subscriber};

struct Pipeline {
    store: InMemoryStore,
    bus: EventBus,
    lifecycle: OrderLifecycle,
    metrics: Arc<MetricsAggregator>,
    handles: Vec<SubscriberHandle>,
}

impl Pipeline {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let bus = EventBus::new();
        let lifecycle = OrderLifecycle::new(StateDeps::from_store(
            store.clone(),
            Arc::new(bus.clone()),
        ));
        let metrics = Arc::new(MetricsAggregator::new());

        let handles = vec![
            spawn_subscriber(
                Arc::new(InventoryConsumer::from_store(
                    store.clone(),
                    Arc::new(bus.clone()),
                )),
                bus.subscribe_new(
                    &[EventKind::ProductCreationRequired],
                    DEFAULT_INBOX_CAPACITY,
                )
                .unwrap(),
            ),
            spawn_subscriber(
                Arc::new(AuditTrail::new(Arc::new(store.clone()))),
                bus.subscribe_new(&EventKind::SPECIFIC, DEFAULT_INBOX_CAPACITY)
                    .unwrap(),
            ),
            spawn_subscriber(
                Arc::new(FinancialPosting::new(Arc::new(store.clone()))),
                bus.subscribe_new(&FinancialPosting::KINDS, DEFAULT_INBOX_CAPACITY)
                    .unwrap(),
            ),
            spawn_subscriber(
                metrics.clone(),
                bus.subscribe_new(&[EventKind::StatusChanged], DEFAULT_INBOX_CAPACITY)
                    .unwrap(),
            ),
        ];

        Self {
            store,
            bus,
            lifecycle,
            metrics,
            handles,
        }
    }

    /// Closes the bus and waits for every subscriber to drain.
    async fn shutdown(self) -> (InMemoryStore, MetricsAggregator) {
        self.bus.close();
        for handle in self.handles {
            handle.join().await.unwrap();
        }
        assert_eq!(self.bus.dropped_total(), 0);
        (self.store, self.metrics.as_ref().clone())
    }

    async fn variant(&self, stock: u32) -> ProductVariant {
        self.store
            .create_variant(ProductVariant::new(
                ProductId::new(),
                "black",
                "M",
                Money::from_cents(5000),
                stock,
            ))
            .await
            .unwrap()
    }

    async fn wait_for_reserved(&self, order_id: OrderId, expected: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let items = self
                    .store
                    .get_order_items_by_order(order_id)
                    .await
                    .unwrap();
                if items.iter().map(|i| i.reserved_quantity()).sum::<u32>() == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn test_custom_order_manufactures_shortfall_and_delivers() {
    let pipeline = Pipeline::new();
    let variant = pipeline.variant(4).await;
    let mut order = Order::new(
        OrderType::Custom,
        None,
        vec![
            OrderItem::new("Jacket", "black", "M", 10, Money::from_cents(5000))
                .with_variant(variant.id),
        ],
        Money::zero(),
    );

    pipeline.lifecycle.start(&mut order).await.unwrap();
    for status in [
        OrderStatus::Approved,
        OrderStatus::Manufacturing,
        OrderStatus::Finished,
    ] {
        pipeline
            .lifecycle
            .transition(&mut order, status)
            .await
            .unwrap();
    }
    assert_eq!(order.status(), OrderStatus::Finished);

    // The inventory consumer produces the missing six units and reserves them.
    pipeline.wait_for_reserved(order.id(), 10).await;
    let v = pipeline.store.variant(variant.id).await.unwrap();
    assert_eq!(v.stock(), 10);
    assert_eq!(v.reserved_stock(), 10);

    pipeline
        .lifecycle
        .transition(&mut order, OrderStatus::Delivered)
        .await
        .unwrap();
    let v = pipeline.store.variant(variant.id).await.unwrap();
    assert_eq!(v.stock(), 0);
    assert_eq!(v.reserved_stock(), 0);

    let (store, metrics) = pipeline.shutdown().await;

    let audited: Vec<EventKind> = store
        .audit_logs()
        .await
        .iter()
        .map(|log| log.event_kind)
        .collect();
    for kind in [
        EventKind::OrderApproved,
        EventKind::OrderManufacturing,
        EventKind::OrderFinished,
        EventKind::ProductCreationRequired,
        EventKind::StockUpdated,
        EventKind::StockReserved,
        EventKind::OrderDelivered,
        EventKind::StockReleased,
        EventKind::SaleCompleted,
    ] {
        assert!(audited.contains(&kind), "{kind} not audited");
    }
    assert!(!audited.contains(&EventKind::StatusChanged));

    let income = store.financial_transactions().await;
    assert_eq!(income.len(), 1);
    assert_eq!(income[0].kind, FinancialTransactionKind::Income);
    assert_eq!(income[0].amount, Money::from_cents(50_000));

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.approved, 1);
    assert_eq!(snapshot.delivered, 1);
    assert_eq!(snapshot.manufactured, 1);
    assert_eq!(snapshot.revenue, Money::from_cents(50_000));
    assert_eq!(snapshot.completion_rate, 100.0);
    assert_eq!(snapshot.cancellation_rate, 0.0);
}

#[tokio::test]
async fn test_internal_customer_sale_posts_debt() {
    let pipeline = Pipeline::new();
    let customer = Customer::new("Warehouse staff", true);
    pipeline.store.insert_customer(customer.clone()).await;
    let variant = pipeline.variant(5).await;

    let mut order = Order::new(
        OrderType::Sale,
        Some(customer.id),
        vec![
            OrderItem::new("Jacket", "black", "M", 2, Money::from_cents(5000))
                .with_variant(variant.id),
        ],
        Money::from_cents(1000),
    );
    pipeline.lifecycle.start(&mut order).await.unwrap();
    pipeline
        .lifecycle
        .transition(&mut order, OrderStatus::Confirmed)
        .await
        .unwrap();
    pipeline
        .lifecycle
        .transition(&mut order, OrderStatus::Delivered)
        .await
        .unwrap();

    let (store, metrics) = pipeline.shutdown().await;

    let debts = store.customer_transactions().await;
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0].customer_id, customer.id);
    assert_eq!(debts[0].kind, CustomerTransactionKind::Debt);
    assert_eq!(debts[0].amount, Money::from_cents(9000));
    assert!(store.financial_transactions().await.is_empty());

    let v = store.variant(variant.id).await.unwrap();
    assert_eq!(v.stock(), 3);
    assert_eq!(v.reserved_stock(), 0);

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.delivered, 1);
    assert_eq!(snapshot.total_transitions, 3);
    assert_eq!(snapshot.by_type[&OrderType::Sale], 6);
}

#[tokio::test]
async fn test_inventory_order_creates_catalog_entries() {
    let pipeline = Pipeline::new();
    let mut order = Order::new(
        OrderType::Inventory,
        None,
        vec![OrderItem::new("Tote", "natural", "one", 25, Money::from_cents(1500)).with_category("bags")],
        Money::zero(),
    );

    pipeline.lifecycle.start(&mut order).await.unwrap();
    pipeline
        .lifecycle
        .transition(&mut order, OrderStatus::Manufacturing)
        .await
        .unwrap();
    pipeline
        .lifecycle
        .transition(&mut order, OrderStatus::Finished)
        .await
        .unwrap();

    let order_id = order.id();
    let (store, _) = pipeline.shutdown().await;

    let products = store.products().await;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].name, "Tote");

    let variants = store.variants().await;
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].stock(), 25);
    assert_eq!(variants[0].reserved_stock(), 0);

    let items = store.get_order_items_by_order(order_id).await.unwrap();
    assert_eq!(items[0].variant_id, Some(variants[0].id));
}
