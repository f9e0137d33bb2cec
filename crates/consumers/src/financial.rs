//! Financial posting for completed sales.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::RecordId;
use domain::{
    CustomerTransaction, CustomerTransactionKind, EventKind, EventPayload, FinancialRepository,
    FinancialTransaction, FinancialTransactionKind, OrderEvent,
};
use event_bus::EventHandler;

use crate::ConsumerError;

/// Books income for `sale.completed` and customer debt for
/// `internal.customer.sale.completed`. Other kinds are ignored.
pub struct FinancialPosting {
    repository: Arc<dyn FinancialRepository>,
}

impl FinancialPosting {
    pub fn new(repository: Arc<dyn FinancialRepository>) -> Self {
        Self { repository }
    }

    /// Kinds this consumer acts on.
    pub const KINDS: [EventKind; 2] = [
        EventKind::SaleCompleted,
        EventKind::InternalCustomerSaleCompleted,
    ];
}

#[async_trait]
impl EventHandler for FinancialPosting {
    type Error = ConsumerError;

    fn name(&self) -> &'static str {
        "financial_posting"
    }

    #[tracing::instrument(skip(self, event), fields(kind = %event.kind, order_id = %event.order_id))]
    async fn handle(&self, event: OrderEvent) -> Result<(), ConsumerError> {
        if !Self::KINDS.contains(&event.kind) {
            return Ok(());
        }
        let EventPayload::Sale {
            customer_id,
            amount,
        } = event.payload.as_ref()
        else {
            return Err(ConsumerError::unexpected(event.kind, "expected a sale payload"));
        };

        match event.kind {
            EventKind::SaleCompleted => {
                self.repository
                    .create_financial_transaction(FinancialTransaction {
                        id: RecordId::new(),
                        order_id: event.order_id,
                        kind: FinancialTransactionKind::Income,
                        amount: *amount,
                        description: format!("Sale of order {}", event.order_id),
                        created_at: Utc::now(),
                    })
                    .await?;
                tracing::info!(%amount, "income posted");
            }
            _ => {
                let customer_id = customer_id.ok_or_else(|| {
                    ConsumerError::unexpected(event.kind, "internal sale without a customer")
                })?;
                self.repository
                    .create_customer_transaction(CustomerTransaction {
                        id: RecordId::new(),
                        customer_id,
                        order_id: event.order_id,
                        kind: CustomerTransactionKind::Debt,
                        amount: *amount,
                        description: format!("Internal sale of order {}", event.order_id),
                        created_at: Utc::now(),
                    })
                    .await?;
                tracing::info!(%amount, %customer_id, "customer debt posted");
            }
        }
        Ok(())
    }
}
