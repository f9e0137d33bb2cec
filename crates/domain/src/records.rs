//! Customers and the audit/accounting records written by consumers.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, RecordId};
use serde::{Deserialize, Serialize};

use crate::events::EventKind;
use crate::order::OrderStatus;

/// A customer placing orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Internal customers settle through a debt ledger instead of revenue.
    pub is_internal: bool,
}

impl Customer {
    pub fn new(name: impl Into<String>, is_internal: bool) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
            is_internal,
        }
    }
}

/// One audit trail entry per observed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: RecordId,
    pub order_id: OrderId,
    pub event_kind: EventKind,
    pub from_status: Option<OrderStatus>,
    pub to_status: Option<OrderStatus>,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialTransactionKind {
    Income,
}

impl FinancialTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinancialTransactionKind::Income => "income",
        }
    }
}

/// Revenue recognized for a completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub id: RecordId,
    pub order_id: OrderId,
    pub kind: FinancialTransactionKind,
    pub amount: Money,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerTransactionKind {
    Debt,
}

impl CustomerTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerTransactionKind::Debt => "debt",
        }
    }
}

/// A debt-ledger entry for an internal customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTransaction {
    pub id: RecordId,
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub kind: CustomerTransactionKind,
    pub amount: Money,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
