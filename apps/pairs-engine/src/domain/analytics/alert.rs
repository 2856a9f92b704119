//! Z-score threshold alerts.

use std::fmt;

use serde::Serialize;

/// Fires when the latest z-score leaves the `[-threshold, threshold]` band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZScoreAlert {
    threshold: f64,
}

/// Which side of the band was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Breach {
    /// `z >= threshold`.
    Above,
    /// `z <= -threshold`.
    Below,
}

/// A triggered alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertEvent {
    /// Side breached.
    pub breach: Breach,
    /// Z-score that triggered it.
    pub zscore: f64,
    /// Configured threshold.
    pub threshold: f64,
}

impl ZScoreAlert {
    /// Alert at `threshold`; its absolute value is used.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    /// Configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluate one z-score. `NaN` never fires.
    #[must_use]
    pub fn check(&self, zscore: f64) -> Option<AlertEvent> {
        let breach = if zscore >= self.threshold {
            Breach::Above
        } else if zscore <= -self.threshold {
            Breach::Below
        } else {
            return None;
        };
        Some(AlertEvent {
            breach,
            zscore,
            threshold: self.threshold,
        })
    }
}

impl Default for ZScoreAlert {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.breach {
            Breach::Above => write!(f, "z-score {:.2} >= {:.2}", self.zscore, self.threshold),
            Breach::Below => write!(f, "z-score {:.2} <= -{:.2}", self.zscore, self.threshold),
        }
    }
}
