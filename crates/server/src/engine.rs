//! Wiring of the event bus, the lifecycle driver and the consumers.

use std::sync::Arc;

use consumers::{AuditTrail, FinancialPosting, InventoryConsumer, MetricsAggregator};
use domain::{
    AuditRepository, CustomerRepository, EventKind, EventPublisher, FinancialRepository,
    OrderItemRepository, OrderLifecycle, ProductRepository, StateDeps, VariantRepository,
};
use event_bus::{EventBus, SubscriberHandle, spawn_subscriber};
use futures_util::future::join_all;

use crate::Result;

/// A running engine: one bus, the lifecycle driver publishing to it and one
/// subscriber task per consumer.
pub struct Engine {
    bus: EventBus,
    lifecycle: Arc<OrderLifecycle>,
    metrics: Arc<MetricsAggregator>,
    handles: Vec<SubscriberHandle>,
}

impl Engine {
    /// Subscribes every consumer and spawns its task. `store` backs both the
    /// lifecycle and the consumers.
    pub fn start<S>(store: S, inbox_capacity: usize) -> Result<Self>
    where
        S: VariantRepository
            + ProductRepository
            + OrderItemRepository
            + CustomerRepository
            + AuditRepository
            + FinancialRepository
            + Clone
            + 'static,
    {
        let bus = EventBus::new();
        let publisher: Arc<dyn EventPublisher> = Arc::new(bus.clone());
        let metrics = Arc::new(MetricsAggregator::new());

        let handles = vec![
            spawn_subscriber(
                Arc::new(InventoryConsumer::from_store(
                    store.clone(),
                    publisher.clone(),
                )),
                bus.subscribe_new(&[EventKind::ProductCreationRequired], inbox_capacity)?,
            ),
            spawn_subscriber(
                Arc::new(AuditTrail::new(Arc::new(store.clone()))),
                bus.subscribe_new(&EventKind::SPECIFIC, inbox_capacity)?,
            ),
            spawn_subscriber(
                Arc::new(FinancialPosting::new(Arc::new(store.clone()))),
                bus.subscribe_new(&FinancialPosting::KINDS, inbox_capacity)?,
            ),
            spawn_subscriber(
                metrics.clone(),
                bus.subscribe_new(&[EventKind::StatusChanged], inbox_capacity)?,
            ),
        ];

        let lifecycle = Arc::new(OrderLifecycle::new(StateDeps::from_store(
            store, publisher,
        )));
        tracing::info!(subscribers = handles.len(), inbox_capacity, "engine started");

        Ok(Self {
            bus,
            lifecycle,
            metrics,
            handles,
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Driver for orders processed by this engine.
    pub fn lifecycle(&self) -> Arc<OrderLifecycle> {
        self.lifecycle.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        self.metrics.clone()
    }

    /// Closes the bus and waits for every subscriber to drain its inbox and
    /// run its shutdown hook.
    pub async fn shutdown(self) -> Result<()> {
        self.bus.close();
        let results = join_all(self.handles.into_iter().map(|handle| {
            let name = handle.name();
            async move { (name, handle.stop().await) }
        }))
        .await;

        let mut first_error = None;
        for (name, result) in results {
            if let Err(e) = result {
                tracing::error!(subscriber = name, error = %e, "subscriber task failed");
                first_error.get_or_insert(e);
            }
        }
        tracing::info!("engine stopped");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
