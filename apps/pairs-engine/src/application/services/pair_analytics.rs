//! Pair Analytics Service
//!
//! Composes the store's resampling with the analytics engine: for a pair of
//! symbols it resamples both over a lookback, aligns their closes, and
//! derives hedge ratio, spread, z-score, correlation and the z-score alert
//! in one call. The stationarity test and backtest are run on demand from
//! the resulting [`PairSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::application::ports::BarSource;
use crate::domain::analytics::{
    AlertEvent, BacktestResult, StationarityResult, Thresholds, ZScoreAlert, backtest,
    hedge_ratio, rolling_corr, rolling_zscore, spread, stationarity_test,
};
use crate::domain::bar::{Timeframe, closes};
use crate::domain::series::{Series, align};
use crate::domain::tick::{Symbol, normalize_symbol};
use crate::error::QueryError;

/// Parameters of one pair computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRequest {
    /// Dependent leg.
    pub y: Symbol,
    /// Independent leg.
    pub x: Symbol,
    /// Bar width.
    pub timeframe: Timeframe,
    /// How far back from now to read.
    pub lookback: Duration,
    /// Rolling window in bars.
    pub window: usize,
}

impl PairRequest {
    /// Request for `y` against `x` with normalized symbols.
    #[must_use]
    pub fn new(y: &str, x: &str, timeframe: Timeframe, lookback: Duration, window: usize) -> Self {
        Self {
            y: normalize_symbol(y),
            x: normalize_symbol(x),
            timeframe,
            lookback,
            window,
        }
    }
}

/// Everything derived for one pair at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSnapshot {
    /// Dependent leg symbol.
    pub y_symbol: Symbol,
    /// Independent leg symbol.
    pub x_symbol: Symbol,
    /// Aligned close prices of `y`.
    pub y: Series,
    /// Aligned close prices of `x`.
    pub x: Series,
    /// OLS slope of `y` on `x`; `NaN` when undefined.
    pub hedge_ratio: f64,
    /// `y - hedge_ratio * x`.
    pub spread: Series,
    /// Rolling z-score of the spread.
    pub zscore: Series,
    /// Rolling correlation of the closes.
    pub correlation: Series,
    /// Most recent defined z-score.
    pub latest_zscore: Option<f64>,
    /// Alert for the latest z-score, if it breaches the band.
    pub alert: Option<AlertEvent>,
}

impl PairSnapshot {
    /// True when the legs share no bars yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spread.is_empty()
    }

    /// ADF test on the spread.
    #[must_use]
    pub fn stationarity(&self) -> StationarityResult {
        stationarity_test(&self.spread)
    }

    /// Mean-reversion backtest of the spread against its z-score.
    ///
    /// # Errors
    ///
    /// Only fails if the snapshot was modified into misaligned series.
    pub fn backtest(&self, thresholds: Thresholds) -> Result<BacktestResult, QueryError> {
        backtest(&self.zscore, &self.spread, thresholds)
    }
}

/// Computes [`PairSnapshot`]s from a [`BarSource`].
pub struct PairAnalytics {
    bars: Arc<dyn BarSource>,
    alert: ZScoreAlert,
}

impl std::fmt::Debug for PairAnalytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairAnalytics")
            .field("alert", &self.alert)
            .finish_non_exhaustive()
    }
}

impl PairAnalytics {
    /// Service reading bars from `bars`, alerting with `alert`.
    #[must_use]
    pub fn new(bars: Arc<dyn BarSource>, alert: ZScoreAlert) -> Self {
        Self { bars, alert }
    }

    /// Snapshot over the lookback ending now.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for a zero window or a failed read.
    pub fn snapshot(&self, request: &PairRequest) -> Result<PairSnapshot, QueryError> {
        self.snapshot_at(request, Utc::now().timestamp_millis())
    }

    /// Snapshot over the lookback ending at `now_ms` inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for a zero window or a failed read.
    pub fn snapshot_at(
        &self,
        request: &PairRequest,
        now_ms: i64,
    ) -> Result<PairSnapshot, QueryError> {
        if request.window == 0 {
            return Err(QueryError::ZeroWindow);
        }

        let lookback_ms = i64::try_from(request.lookback.as_millis()).unwrap_or(i64::MAX);
        let since = now_ms.saturating_sub(lookback_ms);
        let until = now_ms.saturating_add(1);
        let width = request.timeframe.duration();

        let y_bars = self.bars.resample(&request.y, since, until, width)?;
        let x_bars = self.bars.resample(&request.x, since, until, width)?;
        let (y, x) = align(&closes(&y_bars), &closes(&x_bars));

        let beta = hedge_ratio(&y, &x)?;
        let spread = spread(&y, &x, beta)?;
        let zscore = rolling_zscore(&spread, request.window)?;
        let correlation = rolling_corr(&y, &x, request.window)?;

        let latest_zscore = zscore.last_valid().map(|(_, z)| z);
        let alert = latest_zscore.and_then(|z| self.alert.check(z));
        if let Some(event) = &alert {
            tracing::info!(y = %request.y, x = %request.x, alert = %event, "z-score alert");
        }

        Ok(PairSnapshot {
            y_symbol: request.y.clone(),
            x_symbol: request.x.clone(),
            y,
            x,
            hedge_ratio: beta,
            spread,
            zscore,
            correlation,
            latest_zscore,
            alert,
        })
    }
}
