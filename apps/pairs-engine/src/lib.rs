#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::items_after_statements
    )
)]

//! Pairs Engine - Tick Ingestion and Pairs Analytics
//!
//! Keeps one trade stream open per symbol, persists every tick to an
//! append-only SQLite log, and derives the resampled series and statistics
//! used to analyse a pair of instruments.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and pure logic
//!   - `tick`, `bar`, `series`: ticks, OHLCV bars, aligned value series
//!   - `connection`: per-symbol lifecycle state and counters
//!   - `analytics`: hedge ratio, spread, z-score, correlation, ADF, backtest
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: feed connector/session, decoder, tick sink, bar source
//!   - `services`: ingestion supervisor, stream connection, pair analytics
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket trade streams
//!   - `storage`: SQLite tick store
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! btcusdt@trade ──► StreamConnection ──┐
//!                                      ├──► TickStore ──► resample ──► analytics
//! ethusdt@trade ──► StreamConnection ──┘    (SQLite)
//!        ▲
//!        └── IngestionSupervisor (backoff, start/stop)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types and pure analytics.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Error taxonomy shared across layers.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::analytics::{
    AlertEvent, BacktestResult, Breach, StationarityResult, Thresholds, ZScoreAlert, backtest,
    hedge_ratio, rolling_corr, rolling_zscore, spread, stationarity_test,
};
pub use domain::bar::{Bar, Timeframe};
pub use domain::connection::{ConnectionSnapshot, ConnectionState};
pub use domain::series::{Series, align};
pub use domain::tick::{Symbol, Tick};

// Errors
pub use error::{ConnectionError, DecodeError, QueryError, StorageError};

// Services
pub use application::services::{
    FeedPipeline, IngestionSupervisor, PairAnalytics, PairRequest, PairSnapshot, SupervisorConfig,
};

// Infrastructure
pub use infrastructure::binance::{BinanceConnector, BinanceTradeCodec};
pub use infrastructure::config::{ConfigError, EngineConfig};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::storage::TickStore;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
