//! Pairs Engine Binary
//!
//! Starts tick ingestion for the configured symbols and serves the health
//! endpoint until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin pairs-engine
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `PAIRS_SYMBOLS`: Comma-separated symbols (default: btcusdt,ethusdt)
//! - `PAIRS_DB_PATH`: SQLite file (default: data/ticks.db)
//! - `PAIRS_FEED_URL`: Stream base URL (default: <wss://fstream.binance.com/ws>)
//! - `PAIRS_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 10)
//! - `PAIRS_HEARTBEAT_INTERVAL_SECS` / `PAIRS_HEARTBEAT_TIMEOUT_SECS` (default: 15 / 20)
//! - `PAIRS_RECONNECT_DELAY_INITIAL_MS` / `PAIRS_RECONNECT_DELAY_MAX_SECS` (default: 1000 / 30)
//! - `PAIRS_RECONNECT_DELAY_MULTIPLIER`: Backoff factor (default: 2.0)
//! - `PAIRS_RECONNECT_JITTER`: Backoff jitter fraction (default: 0.0)
//! - `PAIRS_SHUTDOWN_GRACE_SECS`: Stop grace period (default: 2)
//! - `PAIRS_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log filter (default: `pairs_engine=info`)

use std::sync::Arc;

use anyhow::Context;
use pairs_engine::application::services::{FeedPipeline, IngestionSupervisor};
use pairs_engine::infrastructure::binance::{BinanceConnector, BinanceTradeCodec};
use pairs_engine::infrastructure::config::EngineConfig;
use pairs_engine::infrastructure::health::{HealthServer, HealthServerState};
use pairs_engine::infrastructure::storage::TickStore;
use pairs_engine::infrastructure::telemetry;
use pairs_engine::init_metrics;
use tokio::runtime::Handle;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("a rustls crypto provider is already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting pairs engine");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let store = Arc::new(
        TickStore::open(&config.db_path)
            .with_context(|| format!("opening tick store at {}", config.db_path.display()))?,
    );

    let pipeline = FeedPipeline {
        connector: Arc::new(BinanceConnector::new(config.connector())),
        decoder: Arc::new(BinanceTradeCodec::new()),
        sink: store,
    };
    let supervisor = Arc::new(IngestionSupervisor::new(
        pipeline,
        config.supervisor(),
        Handle::current(),
    ));

    let shutdown_token = CancellationToken::new();

    let health_task = (config.server.health_port != 0).then(|| {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&supervisor),
        ));
        let server = HealthServer::new(config.server.health_port, state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        })
    });

    supervisor.start(&config.symbols);
    tracing::info!(symbols = ?supervisor.symbols(), "Ingestion started");

    await_shutdown(shutdown_token).await?;

    supervisor.stop().await;
    if let Some(task) = health_task
        && let Err(e) = task.await
    {
        tracing::warn!(error = %e, "Health server task failed");
    }

    tracing::info!("Pairs engine stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        symbols = ?config.symbols,
        db_path = %config.db_path.display(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        feed_url = %config.feed.url,
        connect_timeout_secs = config.feed.connect_timeout.as_secs(),
        reconnect_initial_ms =
            u64::try_from(config.feed.reconnect_delay_initial.as_millis()).unwrap_or(u64::MAX),
        reconnect_max_secs = config.feed.reconnect_delay_max.as_secs(),
        "Feed settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    #[cfg(unix)]
    let terminated = terminate.recv();

    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("waiting for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminated => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    Ok(())
}
