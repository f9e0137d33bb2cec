//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub bus_closed: bool,
    pub dropped_events: u64,
}

/// GET /health: returns system health status.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let bus_closed = state.bus.is_closed();
    Json(HealthResponse {
        status: if bus_closed { "closing" } else { "ok" },
        bus_closed,
        dropped_events: state.bus.dropped_total(),
    })
}
