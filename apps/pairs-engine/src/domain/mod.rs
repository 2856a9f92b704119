//! Domain Layer - Core tick, bar and analytics types.
//!
//! Nothing here performs I/O. Types are plain data with serialization
//! support; the analytics are pure functions over [`series::Series`].

/// Trade ticks and symbol normalization.
pub mod tick;

/// OHLCV bars, bucket widths and timeframes.
pub mod bar;

/// Time-indexed value series and alignment.
pub mod series;

/// Per-symbol connection lifecycle state.
pub mod connection;

/// Pairs statistics, stationarity test and backtest.
pub mod analytics;
