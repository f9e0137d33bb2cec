//! Subscribers reacting to order events.
//!
//! This crate provides:
//! - [`InventoryConsumer`]: manufactures stock and reserves it for custom orders
//! - [`AuditTrail`]: one audit record per event
//! - [`FinancialPosting`]: income and customer debt for completed sales
//! - [`MetricsAggregator`]: order counters and rates over the generic stream
//!
//! Each implements [`event_bus::EventHandler`] and runs through
//! [`event_bus::spawn_subscriber`].

pub mod aggregator;
pub mod audit;
pub mod error;
pub mod financial;
pub mod inventory;

pub use aggregator::{MetricsAggregator, OrderMetrics};
pub use audit::AuditTrail;
pub use error::{ConsumerError, Result};
pub use financial::FinancialPosting;
pub use inventory::InventoryConsumer;
