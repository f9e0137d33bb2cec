//! Startup and shutdown errors of the server.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Event bus error: {0}")]
    Bus(#[from] event_bus::EventBusError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Metrics recorder error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subscriber task failed: {0}")]
    Subscriber(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
