//! OHLCV Bars and Resampling
//!
//! Bars are derived on demand from ticks and never stored. Buckets are
//! aligned to the epoch: a tick at `ts` belongs to the bucket starting at
//! `ts - ts mod width`, independent of the query range.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::series::Series;
use super::tick::Tick;
use crate::error::QueryError;

/// Open-high-low-close-volume aggregate over one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start, UTC epoch milliseconds.
    pub bar_start_ms: i64,
    /// Price of the first tick in the bucket.
    pub open: f64,
    /// Highest price in the bucket.
    pub high: f64,
    /// Lowest price in the bucket.
    pub low: f64,
    /// Price of the last tick in the bucket.
    pub close: f64,
    /// Sum of traded quantity.
    pub volume: f64,
}

impl Bar {
    fn open_with(bar_start_ms: i64, tick: &Tick) -> Self {
        Self {
            bar_start_ms,
            open: tick.price(),
            high: tick.price(),
            low: tick.price(),
            close: tick.price(),
            volume: tick.quantity(),
        }
    }

    fn absorb(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price());
        self.low = self.low.min(tick.price());
        self.close = tick.price();
        self.volume += tick.quantity();
    }
}

/// Validated resample bucket width in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketWidth(i64);

impl BucketWidth {
    /// Build a bucket width from a duration.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidBucketWidth`] for widths below one
    /// millisecond.
    pub fn new(width: Duration) -> Result<Self, QueryError> {
        match i64::try_from(width.as_millis()) {
            Ok(ms) if ms > 0 => Ok(Self(ms)),
            _ => Err(QueryError::InvalidBucketWidth(width)),
        }
    }

    /// Width in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Start of the bucket containing `timestamp_ms`.
    #[must_use]
    pub const fn bucket_start(self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.0)
    }
}

/// Named resampling frequencies accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    /// One second.
    OneSecond,
    /// One minute.
    OneMinute,
    /// Five minutes.
    FiveMinutes,
}

impl Timeframe {
    /// Parse `1s`, `1m`, `5m` and their long spellings, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnsupportedTimeframe`] for anything else.
    pub fn parse(s: &str) -> Result<Self, QueryError> {
        match s.trim().to_lowercase().as_str() {
            "1s" | "1sec" | "1second" => Ok(Self::OneSecond),
            "1m" | "1min" | "1minute" => Ok(Self::OneMinute),
            "5m" | "5min" | "5minutes" => Ok(Self::FiveMinutes),
            _ => Err(QueryError::UnsupportedTimeframe(s.to_string())),
        }
    }

    /// Bucket duration.
    #[must_use]
    pub const fn duration(self) -> Duration {
        match self {
            Self::OneSecond => Duration::from_secs(1),
            Self::OneMinute => Duration::from_secs(60),
            Self::FiveMinutes => Duration::from_secs(300),
        }
    }

    /// Canonical short label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneSecond => "1s",
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
        }
    }
}

/// Aggregate time-ordered ticks of one symbol into bars.
///
/// Ticks must already be ordered by timestamp, ties by arrival. Buckets
/// without ticks are omitted.
#[must_use]
pub fn aggregate(ticks: &[Tick], width: BucketWidth) -> Vec<Bar> {
    let mut bars: Vec<Bar> = Vec::new();

    for tick in ticks {
        let start = width.bucket_start(tick.timestamp_ms());
        match bars.last_mut() {
            Some(bar) if bar.bar_start_ms == start => bar.absorb(tick),
            _ => bars.push(Bar::open_with(start, tick)),
        }
    }

    bars
}

/// Close prices of a bar sequence as a series keyed by bar start.
#[must_use]
pub fn closes(bars: &[Bar]) -> Series {
    bars.iter().map(|b| (b.bar_start_ms, b.close)).collect()
}
