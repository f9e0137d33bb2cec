//! Server entry point.

use std::sync::Arc;

use domain::InMemoryStore;
use metrics_exporter_prometheus::PrometheusBuilder;
use server::{AppState, Config, Engine};
use store::PostgresStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn start_engine(config: &Config) -> server::Result<Engine> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL store");
            Engine::start(store, config.inbox_capacity)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            Engine::start(InMemoryStore::new(), config.inbox_capacity)
        }
    }
}

#[tokio::main]
async fn main() -> server::Result<()> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    // 3. Start the bus, the consumers and the lifecycle driver
    let engine = start_engine(&config).await?;

    // 4. Build the application
    let app = server::create_app(Arc::new(AppState::from_engine(&engine)), metrics_handle);

    // 5. Serve until a shutdown signal arrives
    let addr = config.addr();
    tracing::info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Drain the subscribers
    engine.shutdown().await?;
    tracing::info!("server shut down gracefully");
    Ok(())
}
