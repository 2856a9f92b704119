//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, per-symbol feed status, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (every symbol connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::IngestionSupervisor;
use crate::domain::connection::{ConnectionSnapshot, ConnectionState};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Whether ingestion is running.
    pub running: bool,
    /// Per-symbol feed status, ordered by symbol.
    pub feeds: Vec<ConnectionSnapshot>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every symbol connected.
    Healthy,
    /// Some symbols connected.
    Degraded,
    /// No symbol connected.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    supervisor: Arc<IngestionSupervisor>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, supervisor: Arc<IngestionSupervisor>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            supervisor,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if is_ready(&state.supervisor.snapshots()) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feeds = state.supervisor.snapshots();
    HealthResponse {
        status: determine_health_status(&feeds),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        running: state.supervisor.is_running(),
        feeds,
    }
}

fn connected_count(feeds: &[ConnectionSnapshot]) -> usize {
    feeds
        .iter()
        .filter(|f| f.state == ConnectionState::Connected)
        .count()
}

fn is_ready(feeds: &[ConnectionSnapshot]) -> bool {
    !feeds.is_empty() && connected_count(feeds) == feeds.len()
}

fn determine_health_status(feeds: &[ConnectionSnapshot]) -> HealthStatus {
    match connected_count(feeds) {
        0 => HealthStatus::Unhealthy,
        n if n == feeds.len() => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn feed(symbol: &str, state: ConnectionState) -> ConnectionSnapshot {
        ConnectionSnapshot {
            symbol: symbol.to_string(),
            state,
            last_connected_at: None,
            last_error: None,
            ticks_received: 0,
            messages_discarded: 0,
            storage_failures: 0,
            reconnect_attempts: 0,
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status_all_connected() {
        let feeds = [
            feed("BTCUSDT", ConnectionState::Connected),
            feed("ETHUSDT", ConnectionState::Connected),
        ];
        assert_eq!(determine_health_status(&feeds), HealthStatus::Healthy);
        assert!(is_ready(&feeds));
    }

    #[test]
    fn determine_status_partial() {
        let feeds = [
            feed("BTCUSDT", ConnectionState::Connected),
            feed("ETHUSDT", ConnectionState::Backoff(Duration::from_secs(2))),
        ];
        assert_eq!(determine_health_status(&feeds), HealthStatus::Degraded);
        assert!(!is_ready(&feeds));
    }

    #[test]
    fn determine_status_none_connected() {
        let feeds = [feed("BTCUSDT", ConnectionState::Connecting)];
        assert_eq!(determine_health_status(&feeds), HealthStatus::Unhealthy);
        assert!(!is_ready(&feeds));
    }

    #[test]
    fn no_symbols_is_not_ready() {
        assert_eq!(determine_health_status(&[]), HealthStatus::Unhealthy);
        assert!(!is_ready(&[]));
    }

    #[test]
    fn feed_snapshot_serializes_backoff_delay() {
        let backoff = ConnectionState::Backoff(Duration::from_secs(4));
        let json = serde_json::to_value(feed("BTCUSDT", backoff)).unwrap();
        assert_eq!(json["state"]["state"], "backoff");
        assert_eq!(json["state"]["delay_ms"], 4000);
    }
}
