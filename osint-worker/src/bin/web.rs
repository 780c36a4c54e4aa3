//! OSINT Web Server - HTTP front end over the worker queues.
//!
//! `POST /investigate` enqueues and returns `202` immediately; `POST /scrape`
//! and `POST /analyze` wait for a worker's reply.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use osint::util::shutdown_signal;
use osint::web::{router, AppState};
use osint::{AmqpTransport, Config, Transport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        rpc_timeout_ms = config.rpc_timeout_ms,
        "config_loaded"
    );

    let transport = AmqpTransport::connect(config.broker_url.clone())
        .await
        .context("Failed to connect to broker")?;
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let state = AppState::open(Arc::clone(&transport), config.clone())
        .await
        .context("Failed to open queues")?;
    let shutdown = state.shutdown.clone();

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("web_server_shutting_down");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    // Close broker connection
    transport
        .close()
        .await
        .context("Failed to close broker connection")?;

    info!("web_server_shutdown_complete");

    Ok(())
}
