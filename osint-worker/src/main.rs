//! OSINT Worker - consume loops for scraping, text analysis and investigations.
//!
//! Connects to the broker, opens the `scrape`, `analyze_text` and
//! `investigate` queues and serves them with `WORKER_CONCURRENCY` loops each
//! until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use osint::util::shutdown_signal;
use osint::{AmqpTransport, Config, Transport, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        broker_url_set = !config.broker_url.is_empty(),
        concurrency = config.worker_concurrency,
        poll_interval_ms = config.poll_interval_ms,
        rpc_timeout_ms = config.rpc_timeout_ms,
        on_decode_error = ?config.on_decode_error,
        on_handler_error = ?config.on_handler_error,
        hostname = %config.hostname,
        "config_loaded"
    );

    let transport = AmqpTransport::connect(config.broker_url.clone())
        .await
        .context("Failed to connect to broker")?;
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let worker = Worker::open(Arc::clone(&transport), &config).await?;

    let run = worker.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result?,
        _ = shutdown_signal() => {
            info!("worker_stopping");
            worker.stop();
            run.await?;
        }
    }

    transport
        .close()
        .await
        .context("Failed to close broker connection")?;

    info!("worker_shutdown_complete");

    Ok(())
}
