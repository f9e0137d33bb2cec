//! Order metrics aggregated from the generic event stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use domain::{OrderEvent, OrderStatus, OrderType};
use event_bus::EventHandler;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::ConsumerError;

/// Point-in-time copy of the aggregated order metrics.
///
/// Rates are percentages. While a rate's denominator is zero the rate keeps
/// its last computed value, which is zero until it is first computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderMetrics {
    /// Events that carried a new status.
    pub total_transitions: u64,
    pub by_status: BTreeMap<OrderStatus, u64>,
    /// Events that carried an order, with or without a new status.
    pub by_type: HashMap<OrderType, u64>,
    pub approved: u64,
    pub cancelled: u64,
    pub delivered: u64,
    /// Orders with a measured Manufacturing to Finished duration.
    pub manufactured: u64,
    pub mean_manufacturing_time: Option<Duration>,
    pub revenue: Money,
    pub average_order_value: Money,
    /// approved / total transitions
    pub approval_rate: f64,
    /// cancelled / approved
    pub cancellation_rate: f64,
    /// delivered / approved
    pub completion_rate: f64,
}

#[derive(Default)]
struct AggregatorState {
    metrics: OrderMetrics,
    manufacturing_started: HashMap<OrderId, DateTime<Utc>>,
    manufacturing_total: Duration,
}

impl AggregatorState {
    fn record(&mut self, event: &OrderEvent) {
        if let Some(order) = &event.order {
            *self.metrics.by_type.entry(order.order_type()).or_default() += 1;
        }
        if let Some(status) = event.new_status {
            self.record_status(event, status);
        }
        self.refresh_rates();
    }

    fn record_status(&mut self, event: &OrderEvent, status: OrderStatus) {
        let metrics = &mut self.metrics;
        metrics.total_transitions += 1;
        *metrics.by_status.entry(status).or_default() += 1;
        metrics::counter!("orders_transitions_total", "status" => status.as_str()).increment(1);

        match status {
            OrderStatus::Approved => metrics.approved += 1,
            OrderStatus::Manufacturing => {
                self.manufacturing_started
                    .insert(event.order_id, event.timestamp);
            }
            OrderStatus::Finished => {
                if let Some(started) = self.manufacturing_started.remove(&event.order_id) {
                    let elapsed = (event.timestamp - started).to_std().unwrap_or_default();
                    self.manufacturing_total += elapsed;
                    metrics.manufactured += 1;
                    metrics.mean_manufacturing_time = Some(Duration::from_secs_f64(
                        self.manufacturing_total.as_secs_f64() / metrics.manufactured as f64,
                    ));
                    metrics::histogram!("orders_manufacturing_seconds")
                        .record(elapsed.as_secs_f64());
                }
            }
            OrderStatus::Delivered => {
                metrics.delivered += 1;
                if let Some(order) = &event.order {
                    let amount = order.net_amount();
                    metrics.revenue += amount;
                    metrics::counter!("orders_revenue_cents_total")
                        .increment(u64::try_from(amount.cents()).unwrap_or(0));
                }
                if let Some(average) = metrics.revenue.split(metrics.delivered) {
                    metrics.average_order_value = average;
                }
            }
            OrderStatus::Cancelled => {
                metrics.cancelled += 1;
                self.manufacturing_started.remove(&event.order_id);
            }
            _ => {}
        }
    }

    fn refresh_rates(&mut self) {
        let metrics = &mut self.metrics;
        if let Some(rate) = percentage(metrics.approved, metrics.total_transitions) {
            metrics.approval_rate = rate;
            metrics::gauge!("orders_approval_rate").set(rate);
        }
        if let Some(rate) = percentage(metrics.cancelled, metrics.approved) {
            metrics.cancellation_rate = rate;
            metrics::gauge!("orders_cancellation_rate").set(rate);
        }
        if let Some(rate) = percentage(metrics.delivered, metrics.approved) {
            metrics.completion_rate = rate;
            metrics::gauge!("orders_completion_rate").set(rate);
        }
    }
}

fn percentage(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64 * 100.0)
}

/// Aggregates order counters, revenue and rates.
///
/// Meant to consume the generic `order.status.changed` stream, so every
/// transition is seen exactly once. Snapshots may be taken concurrently
/// with updates. Clones share the same counters.
#[derive(Clone, Default)]
pub struct MetricsAggregator {
    state: Arc<RwLock<AggregatorState>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the counters. Every event carrying an order counts
    /// towards its type; only events with a new status count as transitions.
    pub async fn record(&self, event: &OrderEvent) {
        self.state.write().await.record(event);
    }

    /// Returns a copy of the current metrics.
    pub async fn snapshot(&self) -> OrderMetrics {
        self.state.read().await.metrics.clone()
    }
}

#[async_trait]
impl EventHandler for MetricsAggregator {
    type Error = ConsumerError;

    fn name(&self) -> &'static str {
        "metrics_aggregator"
    }

    #[tracing::instrument(skip(self, event), fields(kind = %event.kind, order_id = %event.order_id))]
    async fn handle(&self, event: OrderEvent) -> Result<(), ConsumerError> {
        self.record(&event).await;
        Ok(())
    }

    async fn on_shutdown(&self) {
        let metrics = self.snapshot().await;
        tracing::info!(
            total_transitions = metrics.total_transitions,
            approved = metrics.approved,
            cancelled = metrics.cancelled,
            delivered = metrics.delivered,
            revenue = %metrics.revenue,
            approval_rate = metrics.approval_rate,
            cancellation_rate = metrics.cancellation_rate,
            completion_rate = metrics.completion_rate,
            "final order metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use common::VariantId;
    use domain::{EventKind, EventPayload, Order, OrderItem};

    fn order(order_type: OrderType, cents: i64, discount: i64) -> Arc<Order> {
        Arc::new(Order::new(
            order_type,
            None,
            vec![OrderItem::new("Coat", "black", "M", 1, Money::from_cents(cents))],
            Money::from_cents(discount),
        ))
    }

    fn changed(order: &Arc<Order>, status: OrderStatus, at: DateTime<Utc>) -> OrderEvent {
        OrderEvent {
            kind: EventKind::StatusChanged,
            order_id: order.id(),
            order: Some(order.clone()),
            previous_status: None,
            new_status: Some(status),
            payload: Arc::new(EventPayload::None),
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn test_counts_transitions_by_status_and_type() {
        let aggregator = MetricsAggregator::new();
        let custom = order(OrderType::Custom, 1000, 0);
        let sale = order(OrderType::Sale, 1000, 0);
        let now = Utc::now();

        aggregator
            .record(&changed(&custom, OrderStatus::Quote, now))
            .await;
        aggregator
            .record(&changed(&custom, OrderStatus::Approved, now))
            .await;
        aggregator
            .record(&changed(&sale, OrderStatus::Pending, now))
            .await;

        let m = aggregator.snapshot().await;
        assert_eq!(m.total_transitions, 3);
        assert_eq!(m.by_status[&OrderStatus::Approved], 1);
        assert_eq!(m.by_type[&OrderType::Custom], 2);
        assert_eq!(m.by_type[&OrderType::Sale], 1);
    }

    #[tokio::test]
    async fn test_events_without_status_count_only_by_type() {
        let aggregator = MetricsAggregator::new();
        let order = order(OrderType::Sale, 1000, 0);
        let mut event = changed(&order, OrderStatus::Pending, Utc::now());
        event.new_status = None;

        aggregator.record(&event).await;
        let m = aggregator.snapshot().await;
        assert_eq!(m.by_type, HashMap::from([(OrderType::Sale, 1)]));
        assert_eq!(m.total_transitions, 0);
        assert!(m.by_status.is_empty());
        assert_eq!(m.approval_rate, 0.0);
    }

    #[tokio::test]
    async fn test_generic_stock_event_counts_order_type() {
        let aggregator = MetricsAggregator::new();
        let sale = order(OrderType::Sale, 1000, 0);
        let reserved = OrderEvent::stock(EventKind::StockReserved, &sale, VariantId::new(), 1);

        aggregator.record(&reserved.to_generic()).await;
        let m = aggregator.snapshot().await;
        assert_eq!(m.by_type, HashMap::from([(OrderType::Sale, 1)]));
        assert_eq!(m.total_transitions, 0);
    }

    #[tokio::test]
    async fn test_event_without_order_changes_nothing() {
        let aggregator = MetricsAggregator::new();
        let sale = order(OrderType::Sale, 1000, 0);
        let mut event = OrderEvent::stock(EventKind::StockReleased, &sale, VariantId::new(), 1);
        event.order = None;

        aggregator.record(&event.to_generic()).await;
        assert_eq!(aggregator.snapshot().await, OrderMetrics::default());
    }

    #[tokio::test]
    async fn test_rates_keep_last_value_on_zero_denominator() {
        let aggregator = MetricsAggregator::new();
        let now = Utc::now();
        let sale = order(OrderType::Sale, 1000, 0);

        // No approvals yet: cancellation rate cannot be computed.
        aggregator
            .record(&changed(&sale, OrderStatus::Cancelled, now))
            .await;
        let m = aggregator.snapshot().await;
        assert_eq!(m.approval_rate, 0.0);
        assert_eq!(m.cancellation_rate, 0.0);

        let custom = order(OrderType::Custom, 1000, 0);
        aggregator
            .record(&changed(&custom, OrderStatus::Approved, now))
            .await;
        let m = aggregator.snapshot().await;
        assert_eq!(m.approval_rate, 50.0);
        assert_eq!(m.cancellation_rate, 100.0);

        aggregator
            .record(&changed(&custom, OrderStatus::Cancelled, now))
            .await;
        let m = aggregator.snapshot().await;
        assert_eq!(m.cancellation_rate, 200.0);
        assert_eq!(m.completion_rate, 0.0);
    }

    #[tokio::test]
    async fn test_approved_then_cancelled() {
        let aggregator = MetricsAggregator::new();
        let custom = order(OrderType::Custom, 1000, 0);
        let now = Utc::now();

        aggregator
            .record(&changed(&custom, OrderStatus::Approved, now))
            .await;
        aggregator
            .record(&changed(&custom, OrderStatus::Cancelled, now))
            .await;

        let m = aggregator.snapshot().await;
        assert_eq!(m.approval_rate, 50.0);
        assert_eq!(m.cancellation_rate, 100.0);
        assert_eq!(m.completion_rate, 0.0);
    }

    #[tokio::test]
    async fn test_revenue_and_average_order_value() {
        let aggregator = MetricsAggregator::new();
        let now = Utc::now();

        for (cents, discount) in [(3000, 500), (2000, 0)] {
            let order = order(OrderType::Sale, cents, discount);
            aggregator
                .record(&changed(&order, OrderStatus::Delivered, now))
                .await;
        }

        let m = aggregator.snapshot().await;
        assert_eq!(m.delivered, 2);
        assert_eq!(m.revenue, Money::from_cents(4500));
        assert_eq!(m.average_order_value, Money::from_cents(2250));
    }

    #[tokio::test]
    async fn test_mean_manufacturing_time() {
        let aggregator = MetricsAggregator::new();
        let start = Utc::now();

        for minutes in [10, 20] {
            let order = order(OrderType::Inventory, 1000, 0);
            aggregator
                .record(&changed(&order, OrderStatus::Manufacturing, start))
                .await;
            aggregator
                .record(&changed(
                    &order,
                    OrderStatus::Finished,
                    start + TimeDelta::minutes(minutes),
                ))
                .await;
        }
        // Finished without a recorded start is not measured.
        let direct = order(OrderType::Custom, 1000, 0);
        aggregator
            .record(&changed(&direct, OrderStatus::Finished, start))
            .await;

        let m = aggregator.snapshot().await;
        assert_eq!(m.manufactured, 2);
        assert_eq!(m.mean_manufacturing_time, Some(Duration::from_secs(15 * 60)));
    }

    #[tokio::test]
    async fn test_concurrent_snapshots_during_updates() {
        let aggregator = MetricsAggregator::new();
        let order = order(OrderType::Sale, 100, 0);

        let writer = {
            let aggregator = aggregator.clone();
            let order = order.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    aggregator
                        .record(&changed(&order, OrderStatus::Pending, Utc::now()))
                        .await;
                }
            })
        };
        let mut last = 0;
        while !writer.is_finished() {
            let seen = aggregator.snapshot().await.total_transitions;
            assert!(seen >= last);
            last = seen;
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(aggregator.snapshot().await.total_transitions, 100);
    }
}
