//! Time Series
//!
//! [`Series`] is the currency between the tick store and the analytics
//! engine: time-ascending `(timestamp_ms, value)` pairs stored column-wise.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Ordered `(timestamp_ms, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesColumns")]
pub struct Series {
    timestamps: Vec<i64>,
    values: Vec<f64>,
}

impl Series {
    /// Empty series.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from parallel columns, or `None` when their lengths differ.
    #[must_use]
    pub fn from_columns(timestamps: Vec<i64>, values: Vec<f64>) -> Option<Self> {
        (timestamps.len() == values.len()).then_some(Self { timestamps, values })
    }

    /// Append a point. Timestamps are expected to be non-decreasing.
    pub fn push(&mut self, timestamp_ms: i64, value: f64) {
        debug_assert!(self.timestamps.last().is_none_or(|last| *last <= timestamp_ms));
        self.timestamps.push(timestamp_ms);
        self.values.push(value);
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the series has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Timestamp column.
    #[must_use]
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// Value column.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterate over `(timestamp_ms, value)` pairs.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (i64, f64)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// Same timestamps, values replaced by `f(value)`.
    #[must_use]
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            timestamps: self.timestamps.clone(),
            values: self.values.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Same timestamps with the given values.
    ///
    /// Callers guarantee `values.len() == self.len()`.
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.timestamps.len());
        Self {
            timestamps: self.timestamps.clone(),
            values,
        }
    }

    /// Points whose value is not NaN.
    #[must_use]
    pub fn drop_nan(&self) -> Self {
        self.iter().filter(|(_, v)| !v.is_nan()).collect()
    }

    /// Most recent non-NaN point.
    #[must_use]
    pub fn last_valid(&self) -> Option<(i64, f64)> {
        self.iter().rev().find(|(_, v)| !v.is_nan())
    }

    /// True when both series carry identical timestamp sequences.
    #[must_use]
    pub fn is_aligned_with(&self, other: &Self) -> bool {
        self.timestamps == other.timestamps
    }

    /// Fail with [`QueryError::Misaligned`] unless aligned with `other`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Misaligned`] when the timestamp sequences differ.
    pub fn ensure_aligned(&self, other: &Self) -> Result<(), QueryError> {
        if self.is_aligned_with(other) {
            Ok(())
        } else {
            Err(QueryError::Misaligned {
                left: self.len(),
                right: other.len(),
            })
        }
    }
}

/// Wire form of [`Series`], checked before it becomes one.
#[derive(Deserialize)]
struct SeriesColumns {
    timestamps: Vec<i64>,
    values: Vec<f64>,
}

impl TryFrom<SeriesColumns> for Series {
    type Error = QueryError;

    fn try_from(raw: SeriesColumns) -> Result<Self, Self::Error> {
        let (left, right) = (raw.timestamps.len(), raw.values.len());
        Self::from_columns(raw.timestamps, raw.values)
            .ok_or(QueryError::Misaligned { left, right })
    }
}

impl FromIterator<(i64, f64)> for Series {
    fn from_iter<I: IntoIterator<Item = (i64, f64)>>(iter: I) -> Self {
        let mut series = Self::new();
        for (ts, v) in iter {
            series.push(ts, v);
        }
        series
    }
}

/// Reduce two series to their common timestamps.
///
/// Points present in only one input, and points where either value is NaN,
/// are dropped. Both inputs must be time-ascending.
#[must_use]
pub fn align(a: &Series, b: &Series) -> (Series, Series) {
    let mut left = Series::new();
    let mut right = Series::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (ta, tb) = (a.timestamps[i], b.timestamps[j]);
        match ta.cmp(&tb) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let (va, vb) = (a.values[i], b.values[j]);
                if !va.is_nan() && !vb.is_nan() {
                    left.push(ta, va);
                    right.push(tb, vb);
                }
                i += 1;
                j += 1;
            }
        }
    }

    (left, right)
}
