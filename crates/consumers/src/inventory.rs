//! Inventory consumer: turns `product.creation.required` into stock.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, VariantId};
use domain::{
    EventKind, EventPayload, EventPublisher, OrderEvent, OrderItem, OrderItemRepository,
    OrderType, Product, ProductFilter, ProductRepository, ProductVariant, RepositoryError,
    VariantRepository,
};
use event_bus::EventHandler;

use crate::{ConsumerError, Result};

/// Manufactures the units a finished order asks for.
///
/// For each item with units to produce:
/// - an existing variant gets its stock raised by the produced units;
/// - otherwise the product is looked up by name (or created) and a variant
///   with the item's color and size is reused or created;
/// - for custom orders the produced units are reserved at once and the
///   item's reserved quantity is raised to match.
///
/// Publishes `stock.updated` for every restock and `stock.reserved` for
/// every custom reservation.
pub struct InventoryConsumer {
    variants: Arc<dyn VariantRepository>,
    products: Arc<dyn ProductRepository>,
    items: Arc<dyn OrderItemRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl InventoryConsumer {
    pub fn new(
        variants: Arc<dyn VariantRepository>,
        products: Arc<dyn ProductRepository>,
        items: Arc<dyn OrderItemRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            variants,
            products,
            items,
            publisher,
        }
    }

    /// Uses one store for every repository.
    pub fn from_store<S>(store: S, publisher: Arc<dyn EventPublisher>) -> Self
    where
        S: VariantRepository + ProductRepository + OrderItemRepository + Clone + 'static,
    {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            publisher,
        )
    }

    async fn manufacture(
        &self,
        cause: &OrderEvent,
        order_type: OrderType,
        item: &OrderItem,
        produced: u32,
    ) -> Result<()> {
        let reserve = order_type == OrderType::Custom;

        let existing = match item.variant_id {
            Some(id) => self.variants.get_variant(id).await?,
            None => None,
        };
        let variant_id = match existing {
            Some(variant) => {
                self.restock(cause, variant.id, produced, reserve).await?;
                variant.id
            }
            None => self.stock_new(cause, item, produced, reserve).await?,
        };

        let reserved = if reserve { produced } else { 0 };
        self.link_item(cause.order_id, item, variant_id, reserved)
            .await?;

        tracing::info!(
            item_id = %item.id,
            %variant_id,
            produced,
            reserved,
            "units manufactured"
        );
        Ok(())
    }

    /// Adds produced units to an existing variant, reserving them if asked.
    /// Both counters move in one repository call so concurrent reservations
    /// cannot take the new units.
    async fn restock(
        &self,
        cause: &OrderEvent,
        variant_id: VariantId,
        produced: u32,
        reserve: bool,
    ) -> Result<()> {
        self.variants.restock(variant_id, produced, reserve).await?;

        self.publisher.publish(cause.stock_follow_up(
            EventKind::StockUpdated,
            variant_id,
            produced,
        ));
        if reserve {
            self.publisher.publish(cause.stock_follow_up(
                EventKind::StockReserved,
                variant_id,
                produced,
            ));
        }
        Ok(())
    }

    /// Stocks an item that has no variant yet. Returns the variant used.
    async fn stock_new(
        &self,
        cause: &OrderEvent,
        item: &OrderItem,
        produced: u32,
        reserve: bool,
    ) -> Result<VariantId> {
        let product = self.find_or_create_product(item).await?;

        let matching = self
            .products
            .list_variants(product.id)
            .await?
            .into_iter()
            .find(|v| v.color == item.color && v.size == item.size);
        if let Some(variant) = matching {
            self.restock(cause, variant.id, produced, reserve).await?;
            return Ok(variant.id);
        }

        let reserved = if reserve { produced } else { 0 };
        let variant = ProductVariant::new(
            product.id,
            item.color.clone(),
            item.size.clone(),
            item.unit_price,
            produced,
        )
        .restore(produced, reserved)
        .map_err(RepositoryError::from)?;
        let variant = self.variants.create_variant(variant).await?;
        tracing::debug!(variant_id = %variant.id, product_id = %product.id, "variant created");

        self.publisher.publish(cause.stock_follow_up(
            EventKind::StockUpdated,
            variant.id,
            produced,
        ));
        if reserve {
            self.publisher.publish(cause.stock_follow_up(
                EventKind::StockReserved,
                variant.id,
                produced,
            ));
        }
        Ok(variant.id)
    }

    async fn find_or_create_product(&self, item: &OrderItem) -> Result<Product> {
        let found = self
            .products
            .list_products(&ProductFilter::by_name(item.product_name.clone()))
            .await?;
        if let Some(product) = found.into_iter().next() {
            return Ok(product);
        }

        let product = self
            .products
            .create_product(Product::new(item.product_name.clone(), item.category.clone()))
            .await?;
        tracing::debug!(product_id = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    /// Points the stored item at `variant_id` and records `reserved` more
    /// reserved units on it.
    async fn link_item(
        &self,
        order_id: OrderId,
        item: &OrderItem,
        variant_id: VariantId,
        reserved: u32,
    ) -> Result<()> {
        let stored = self
            .items
            .get_order_items_by_order(order_id)
            .await?
            .into_iter()
            .find(|i| i.id == item.id);
        let Some(mut current) = stored else {
            tracing::warn!(item_id = %item.id, %order_id, "order item not stored, not linked");
            return Ok(());
        };

        current.variant_id = Some(variant_id);
        current.add_reserved(reserved);
        self.items.update_order_item(order_id, &current).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for InventoryConsumer {
    type Error = ConsumerError;

    fn name(&self) -> &'static str {
        "inventory"
    }

    #[tracing::instrument(skip(self, event), fields(kind = %event.kind, order_id = %event.order_id))]
    async fn handle(&self, event: OrderEvent) -> Result<()> {
        if event.kind != EventKind::ProductCreationRequired {
            return Ok(());
        }
        let EventPayload::ProductCreation {
            order_type,
            items,
            produced,
        } = event.payload.as_ref()
        else {
            return Err(ConsumerError::unexpected(
                event.kind,
                "expected a product creation payload",
            ));
        };

        for item in items {
            let units = produced.get(&item.id).copied().unwrap_or(0);
            if units == 0 {
                continue;
            }
            self.manufacture(&event, *order_type, item, units).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use common::{Money, ProductId};
    use domain::{InMemoryStore, NoopPublisher, Order};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<OrderEvent>>);

    impl EventPublisher for Recorder {
        fn publish(&self, event: OrderEvent) {
            self.0.lock().push(event);
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<EventKind> {
            self.0.lock().iter().map(|e| e.kind).collect()
        }
    }

    async fn stored_order(store: &InMemoryStore, order_type: OrderType, item: OrderItem) -> Order {
        let order = Order::new(order_type, None, vec![item], Money::zero());
        store.save_order_items(&order).await;
        order
    }

    fn creation(order: &Order, units: u32) -> OrderEvent {
        let produced = order.items().iter().map(|i| (i.id, units)).collect();
        OrderEvent::product_creation(order, produced)
    }

    #[tokio::test]
    async fn test_custom_restock_reserves_produced_units() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(Recorder::default());
        let consumer = InventoryConsumer::from_store(store.clone(), publisher.clone());

        let variant = store
            .create_variant(ProductVariant::new(
                ProductId::new(),
                "blue",
                "M",
                Money::from_cents(5000),
                4,
            ))
            .await
            .unwrap();
        store.reserve_stock(variant.id, 4).await.unwrap();
        let item = OrderItem::new("Shirt", "blue", "M", 10, Money::from_cents(5000))
            .with_variant(variant.id)
            .with_reserved_quantity(4);
        let order = stored_order(&store, OrderType::Custom, item).await;

        consumer.handle(creation(&order, 6)).await.unwrap();

        let v = store.variant(variant.id).await.unwrap();
        assert_eq!(v.stock(), 10);
        assert_eq!(v.reserved_stock(), 10);
        let items = store.get_order_items_by_order(order.id()).await.unwrap();
        assert_eq!(items[0].reserved_quantity(), 10);
        assert_eq!(
            publisher.kinds(),
            vec![EventKind::StockUpdated, EventKind::StockReserved]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_custom_restock_is_not_raced_by_reservations() {
        let store = InMemoryStore::new();
        let consumer = Arc::new(InventoryConsumer::from_store(
            store.clone(),
            Arc::new(NoopPublisher),
        ));

        let variant = store
            .create_variant(ProductVariant::new(
                ProductId::new(),
                "red",
                "L",
                Money::from_cents(4000),
                0,
            ))
            .await
            .unwrap();
        let item = OrderItem::new("Parka", "red", "L", 6, Money::from_cents(4000))
            .with_variant(variant.id);
        let order = stored_order(&store, OrderType::Custom, item).await;

        let competitors: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve_stock(variant.id, 1).await.is_ok() })
            })
            .collect();
        let restock = {
            let consumer = consumer.clone();
            let event = creation(&order, 6);
            tokio::spawn(async move { consumer.handle(event).await })
        };

        restock.await.unwrap().unwrap();
        let mut taken = 0;
        for task in competitors {
            if task.await.unwrap() {
                taken += 1;
            }
        }

        // Produced units are reserved for the order the moment they exist.
        assert_eq!(taken, 0);
        let v = store.variant(variant.id).await.unwrap();
        assert_eq!(v.stock(), 6);
        assert_eq!(v.reserved_stock(), 6);
        let items = store.get_order_items_by_order(order.id()).await.unwrap();
        assert_eq!(items[0].reserved_quantity(), 6);
    }

    #[tokio::test]
    async fn test_inventory_restock_reserves_nothing() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(Recorder::default());
        let consumer = InventoryConsumer::from_store(store.clone(), publisher.clone());

        let variant = store
            .create_variant(ProductVariant::new(
                ProductId::new(),
                "grey",
                "S",
                Money::from_cents(900),
                1,
            ))
            .await
            .unwrap();
        let item = OrderItem::new("Sock", "grey", "S", 20, Money::from_cents(900))
            .with_variant(variant.id);
        let order = stored_order(&store, OrderType::Inventory, item).await;

        consumer.handle(creation(&order, 20)).await.unwrap();

        let v = store.variant(variant.id).await.unwrap();
        assert_eq!(v.stock(), 21);
        assert_eq!(v.reserved_stock(), 0);
        assert_eq!(publisher.kinds(), vec![EventKind::StockUpdated]);
    }

    #[tokio::test]
    async fn test_missing_variant_creates_product_and_variant() {
        let store = InMemoryStore::new();
        let consumer = InventoryConsumer::from_store(store.clone(), Arc::new(NoopPublisher));

        let item = OrderItem::new("Apron", "tan", "one", 3, Money::from_cents(2000))
            .with_category("kitchen");
        let order = stored_order(&store, OrderType::Custom, item).await;

        consumer.handle(creation(&order, 3)).await.unwrap();

        let products = store.products().await;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Apron");
        assert_eq!(products[0].category.as_deref(), Some("kitchen"));

        let variants = store.variants().await;
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].stock(), 3);
        assert_eq!(variants[0].reserved_stock(), 3);
        assert_eq!(variants[0].unit_price, Money::from_cents(2000));

        let items = store.get_order_items_by_order(order.id()).await.unwrap();
        assert_eq!(items[0].variant_id, Some(variants[0].id));
        assert!(items[0].is_fully_reserved());
    }

    #[tokio::test]
    async fn test_existing_product_and_variant_are_reused() {
        let store = InMemoryStore::new();
        let consumer = InventoryConsumer::from_store(store.clone(), Arc::new(NoopPublisher));

        let product = store
            .create_product(Product::new("Towel", None))
            .await
            .unwrap();
        let variant = store
            .create_variant(ProductVariant::new(
                product.id,
                "white",
                "L",
                Money::from_cents(1200),
                2,
            ))
            .await
            .unwrap();
        let item = OrderItem::new("towel", "white", "L", 5, Money::from_cents(1200));
        let order = stored_order(&store, OrderType::Inventory, item).await;

        consumer.handle(creation(&order, 5)).await.unwrap();

        assert_eq!(store.products().await.len(), 1);
        assert_eq!(store.variants().await.len(), 1);
        assert_eq!(store.variant(variant.id).await.unwrap().stock(), 7);
        let items = store.get_order_items_by_order(order.id()).await.unwrap();
        assert_eq!(items[0].variant_id, Some(variant.id));
    }

    #[tokio::test]
    async fn test_items_without_production_are_skipped() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(Recorder::default());
        let consumer = InventoryConsumer::from_store(store.clone(), publisher.clone());

        let item = OrderItem::new("Belt", "brown", "M", 2, Money::from_cents(3000));
        let order = stored_order(&store, OrderType::Custom, item).await;

        consumer
            .handle(OrderEvent::product_creation(&order, HashMap::new()))
            .await
            .unwrap();

        assert!(store.variants().await.is_empty());
        assert!(publisher.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let store = InMemoryStore::new();
        let consumer = InventoryConsumer::from_store(store.clone(), Arc::new(NoopPublisher));
        let order = Order::new(OrderType::Custom, None, Vec::new(), Money::zero());

        let mut event = OrderEvent::transition(EventKind::OrderFinished, &order, None);
        event.kind = EventKind::ProductCreationRequired;

        let err = consumer.handle(event).await.unwrap_err();
        assert!(matches!(err, ConsumerError::UnexpectedPayload { .. }));
    }

    #[tokio::test]
    async fn test_other_kinds_are_ignored() {
        let store = InMemoryStore::new();
        let consumer = InventoryConsumer::from_store(store.clone(), Arc::new(NoopPublisher));
        let order = Order::new(OrderType::Custom, None, Vec::new(), Money::zero());

        consumer
            .handle(OrderEvent::transition(EventKind::OrderApproved, &order, None))
            .await
            .unwrap();
        assert!(store.products().await.is_empty());
    }
}
