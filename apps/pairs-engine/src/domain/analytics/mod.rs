//! Pairs Analytics
//!
//! Pure functions over [`Series`](crate::domain::series::Series). None of
//! them touch I/O or shared state, so they may be called from any thread.

pub mod alert;
pub mod backtest;
pub mod stationarity;
pub mod stats;

pub use alert::{AlertEvent, Breach, ZScoreAlert};
pub use backtest::{BacktestResult, Fill, Side, Thresholds, Trade, backtest};
pub use stationarity::{CriticalValues, StationarityResult, stationarity_test};
pub use stats::{hedge_ratio, rolling_corr, rolling_zscore, spread};
