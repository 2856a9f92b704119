//! Trade Ticks
//!
//! A [`Tick`] is one executed trade. Ticks are validated once, at
//! construction, and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A symbol string (exchange ticker, normalised to upper case).
pub type Symbol = String;

/// Normalise a symbol for storage and lookup.
#[must_use]
pub fn normalize_symbol(symbol: &str) -> Symbol {
    symbol.trim().to_uppercase()
}

/// Reasons a tick can be rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TickError {
    /// Timestamp before the epoch.
    #[error("timestamp must be non-negative, got {0}")]
    NegativeTimestamp(i64),
    /// Price is zero, negative or not finite.
    #[error("price must be positive and finite, got {0}")]
    InvalidPrice(f64),
    /// Quantity is negative or not finite.
    #[error("quantity must be non-negative and finite, got {0}")]
    InvalidQuantity(f64),
    /// Symbol is empty after trimming.
    #[error("symbol must not be empty")]
    EmptySymbol,
}

/// One executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTick")]
pub struct Tick {
    timestamp_ms: i64,
    symbol: Symbol,
    price: f64,
    quantity: f64,
}

impl Tick {
    /// Build a tick, enforcing `timestamp_ms >= 0`, `price > 0` and
    /// `quantity >= 0`.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] naming the first violated invariant.
    pub fn new(
        timestamp_ms: i64,
        symbol: &str,
        price: f64,
        quantity: f64,
    ) -> Result<Self, TickError> {
        if timestamp_ms < 0 {
            return Err(TickError::NegativeTimestamp(timestamp_ms));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(TickError::InvalidPrice(price));
        }
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(TickError::InvalidQuantity(quantity));
        }
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(TickError::EmptySymbol);
        }

        Ok(Self {
            timestamp_ms,
            symbol,
            price,
            quantity,
        })
    }

    /// Trade time in UTC epoch milliseconds.
    #[must_use]
    pub const fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Upper-cased symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Trade price.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Traded quantity.
    #[must_use]
    pub const fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Trade time as a UTC datetime.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// Unvalidated wire form of a [`Tick`].
#[derive(Deserialize)]
struct RawTick {
    timestamp_ms: i64,
    symbol: Symbol,
    price: f64,
    quantity: f64,
}

impl TryFrom<RawTick> for Tick {
    type Error = TickError;

    fn try_from(raw: RawTick) -> Result<Self, Self::Error> {
        Self::new(raw.timestamp_ms, &raw.symbol, raw.price, raw.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn valid_tick_normalises_symbol() {
        let tick = Tick::new(1_700_000_000_000, " btcusdt ", 42_000.5, 0.01).unwrap();
        assert_eq!(tick.symbol(), "BTCUSDT");
        assert_eq!(tick.timestamp_ms(), 1_700_000_000_000);
        assert!((tick.price() - 42_000.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_quantity_is_allowed() {
        assert!(Tick::new(0, "ETHUSDT", 1.0, 0.0).is_ok());
    }

    #[test_case(-1, 1.0, 1.0 ; "negative timestamp")]
    #[test_case(0, 0.0, 1.0 ; "zero price")]
    #[test_case(0, -3.0, 1.0 ; "negative price")]
    #[test_case(0, f64::NAN, 1.0 ; "nan price")]
    #[test_case(0, f64::INFINITY, 1.0 ; "infinite price")]
    #[test_case(0, 1.0, -0.5 ; "negative quantity")]
    #[test_case(0, 1.0, f64::NAN ; "nan quantity")]
    fn invalid_ticks_are_rejected(ts: i64, price: f64, qty: f64) {
        assert!(Tick::new(ts, "BTCUSDT", price, qty).is_err());
    }

    #[test]
    fn empty_symbol_rejected() {
        assert_eq!(Tick::new(0, "   ", 1.0, 1.0), Err(TickError::EmptySymbol));
    }

    #[test]
    fn deserialize_enforces_invariants() {
        let negative_price =
            r#"{"timestamp_ms":2000,"symbol":"BTCUSDT","price":-1.0,"quantity":1.0}"#;
        let err = serde_json::from_str::<Tick>(negative_price).unwrap_err();
        assert!(err.to_string().contains("price must be positive"));

        let negative_time = r#"{"timestamp_ms":-5,"symbol":"BTCUSDT","price":1.0,"quantity":1.0}"#;
        assert!(serde_json::from_str::<Tick>(negative_time).is_err());

        let lower = r#"{"timestamp_ms":2000,"symbol":"btcusdt","price":1.5,"quantity":0.0}"#;
        let tick: Tick = serde_json::from_str(lower).unwrap();
        assert_eq!(tick, Tick::new(2_000, "BTCUSDT", 1.5, 0.0).unwrap());
    }

    #[test]
    fn time_conversion() {
        let tick = Tick::new(1_000, "X", 1.0, 1.0).unwrap();
        assert_eq!(tick.time().unwrap().timestamp(), 1);
    }
}
