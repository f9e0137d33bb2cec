//! Aggregated order metrics.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use consumers::OrderMetrics;

use crate::AppState;

/// GET /orders/metrics: snapshot of the order metrics aggregator.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<OrderMetrics> {
    Json(state.metrics.snapshot().await)
}
