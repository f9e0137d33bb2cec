//! Audit trail: one persisted record per observed event.

use std::sync::Arc;

use async_trait::async_trait;
use common::RecordId;
use domain::{AuditLog, AuditRepository, EventPayload, OrderEvent};
use event_bus::EventHandler;

use crate::ConsumerError;

/// Writes an [`AuditLog`] for every event it receives.
///
/// Subscribe it to the specific kinds of interest; subscribing it to the
/// generic topic as well records transitions twice.
pub struct AuditTrail {
    repository: Arc<dyn AuditRepository>,
}

impl AuditTrail {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }
}

/// Human-readable summary of an event.
fn describe(event: &OrderEvent) -> String {
    match event.payload.as_ref() {
        EventPayload::None => match (event.previous_status, event.new_status) {
            (Some(from), Some(to)) => format!("{from} -> {to}"),
            (None, Some(to)) => format!("entered {to}"),
            _ => event.kind.to_string(),
        },
        EventPayload::Stock {
            variant_id,
            quantity,
        } => format!("{quantity} units of variant {variant_id}"),
        EventPayload::ProductCreation { produced, .. } => format!(
            "{} units to manufacture across {} items",
            produced.values().sum::<u32>(),
            produced.len()
        ),
        EventPayload::Sale {
            customer_id: Some(customer_id),
            amount,
        } => format!("{amount} for customer {customer_id}"),
        EventPayload::Sale {
            customer_id: None,
            amount,
        } => format!("{amount}"),
    }
}

#[async_trait]
impl EventHandler for AuditTrail {
    type Error = ConsumerError;

    fn name(&self) -> &'static str {
        "audit_trail"
    }

    #[tracing::instrument(skip(self, event), fields(kind = %event.kind, order_id = %event.order_id))]
    async fn handle(&self, event: OrderEvent) -> Result<(), ConsumerError> {
        let entry = AuditLog {
            id: RecordId::new(),
            order_id: event.order_id,
            event_kind: event.kind,
            from_status: event.previous_status,
            to_status: event.new_status,
            detail: describe(&event),
            recorded_at: event.timestamp,
        };
        self.repository.create_audit_log(entry).await?;
        tracing::debug!("audit log recorded");
        Ok(())
    }
}
