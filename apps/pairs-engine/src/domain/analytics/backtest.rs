//! Mean-reversion backtest on a spread and its z-score.
//!
//! Position rules, evaluated at every point with a defined z-score:
//!
//! - flat and `z > entry` opens a short spread, flat and `z < -entry` opens
//!   a long spread;
//! - an open position closes when `|z| <= exit`;
//! - an open position flips when `z` crosses the opposite entry band.
//!
//! Per-period P&L is the position held over the period times the spread
//! change, so a trade opened at `i` first accrues at `i + 1`.

use serde::Serialize;

use crate::domain::series::Series;
use crate::error::QueryError;

/// Entry and exit bands in z-score units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    entry: f64,
    exit: f64,
}

impl Thresholds {
    /// Validate `0 <= exit < entry`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidThresholds`] otherwise, including for
    /// non-finite values.
    pub fn new(entry: f64, exit: f64) -> Result<Self, QueryError> {
        if entry.is_finite() && exit.is_finite() && exit >= 0.0 && exit < entry {
            Ok(Self { entry, exit })
        } else {
            Err(QueryError::InvalidThresholds { entry, exit })
        }
    }

    /// Entry band.
    #[must_use]
    pub const fn entry(&self) -> f64 {
        self.entry
    }

    /// Exit band.
    #[must_use]
    pub const fn exit(&self) -> f64 {
        self.exit
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            entry: 2.0,
            exit: 0.0,
        }
    }
}

/// Direction of a spread position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Long the spread: profits when it rises.
    Long,
    /// Short the spread: profits when it falls.
    Short,
}

impl Side {
    const fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

/// One end of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fill {
    /// Index into the input series.
    pub index: usize,
    /// Timestamp of that point.
    pub timestamp_ms: i64,
    /// Spread value at that point.
    pub spread: f64,
}

/// A round trip, or an open position at the end of the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trade {
    /// Position direction.
    pub side: Side,
    /// Opening fill.
    pub entry: Fill,
    /// Closing fill; `None` while still open.
    pub exit: Option<Fill>,
    /// Realized P&L, or mark-to-market at the last point when open.
    pub pnl: f64,
}

/// Backtest output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    /// Trades in opening order.
    pub trades: Vec<Trade>,
    /// P&L accrued over each period, aligned with the input.
    pub pnl: Series,
    /// Cumulative P&L.
    pub equity: Series,
}

impl BacktestResult {
    /// Sum of all period P&L.
    #[must_use]
    pub fn total_pnl(&self) -> f64 {
        self.equity.values().last().copied().unwrap_or(0.0)
    }

    /// Trades that were closed.
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.exit.is_some())
    }
}

/// Run the mean-reversion rules over aligned `zscore` and `spread`.
///
/// `NaN` z-scores leave the position unchanged.
///
/// # Errors
///
/// Returns [`QueryError::Misaligned`] when the inputs differ in timestamps.
pub fn backtest(
    zscore: &Series,
    spread: &Series,
    thresholds: Thresholds,
) -> Result<BacktestResult, QueryError> {
    zscore.ensure_aligned(spread)?;

    let ts = spread.timestamps();
    let sv = spread.values();
    let fill = |i: usize| Fill {
        index: i,
        timestamp_ms: ts[i],
        spread: sv[i],
    };

    let mut trades: Vec<Trade> = Vec::new();
    let mut open: Option<Trade> = None;
    let mut pnl = Vec::with_capacity(sv.len());

    for (i, &z) in zscore.values().iter().enumerate() {
        let period = match (&open, i.checked_sub(1)) {
            (Some(trade), Some(prev)) => {
                let change = sv[i] - sv[prev];
                if change.is_nan() { 0.0 } else { trade.side.sign() * change }
            }
            _ => 0.0,
        };
        pnl.push(period);
        if let Some(trade) = open.as_mut() {
            trade.pnl += period;
        }

        if z.is_nan() {
            continue;
        }

        let target = match open.map(|t| t.side) {
            None if z > thresholds.entry => Some(Side::Short),
            None if z < -thresholds.entry => Some(Side::Long),
            Some(Side::Short) if z < -thresholds.entry => Some(Side::Long),
            Some(Side::Long) if z > thresholds.entry => Some(Side::Short),
            Some(_) if z.abs() <= thresholds.exit => None,
            current => current,
        };

        if target == open.map(|t| t.side) {
            continue;
        }
        if let Some(mut trade) = open.take() {
            trade.exit = Some(fill(i));
            trades.push(trade);
        }
        open = target.map(|side| Trade {
            side,
            entry: fill(i),
            exit: None,
            pnl: 0.0,
        });
    }
    trades.extend(open);

    let equity: Vec<f64> = pnl
        .iter()
        .scan(0.0, |acc, p| {
            *acc += p;
            Some(*acc)
        })
        .collect();

    Ok(BacktestResult {
        trades,
        pnl: spread.with_values(pnl),
        equity: spread.with_values(equity),
    })
}
