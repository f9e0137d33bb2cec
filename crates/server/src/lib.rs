//! Host process for the order lifecycle engine.
//!
//! Wires the event bus, the lifecycle driver and every consumer around one
//! store, and serves health, Prometheus and order metrics over HTTP.

pub mod config;
pub mod engine;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use consumers::MetricsAggregator;
use event_bus::EventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use engine::Engine;
pub use error::{Result, ServerError};

/// State shared by the HTTP handlers.
pub struct AppState {
    pub bus: EventBus,
    pub metrics: Arc<MetricsAggregator>,
}

impl AppState {
    pub fn from_engine(engine: &Engine) -> Self {
        Self {
            bus: engine.bus().clone(),
            metrics: engine.metrics(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders/metrics", get(routes::orders::metrics))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
