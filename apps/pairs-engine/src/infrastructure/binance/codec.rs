//! Trade Stream Codec
//!
//! Decodes Binance `<symbol>@trade` events into ticks.
//!
//! ```json
//! {"e":"trade","E":1700000000123,"s":"BTCUSDT","t":1,"p":"37000.10","q":"0.005","T":1700000000120,"m":true}
//! ```
//!
//! - event time `E`, falling back to trade time `T`; zero counts as absent
//! - price `p` (or `price`) and quantity `q` (or `qty`), as strings or numbers
//! - symbol `s`, falling back to the subscribed symbol
//! - combined-stream envelopes `{"stream":..,"data":{..}}` are unwrapped
//!
//! Anything else, including subscription acknowledgements, is a
//! [`DecodeError`].

use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::TickDecoder;
use crate::domain::tick::Tick;
use crate::error::DecodeError;

/// JSON number or numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Numeric {
    fn to_f64(&self, field: &'static str) -> Result<f64, DecodeError> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Ok(*i as f64),
            Self::Float(f) => Ok(*f),
            Self::Text(s) => s.trim().parse().map_err(|_| DecodeError::NotNumeric {
                field,
                value: s.clone(),
            }),
        }
    }

    fn to_millis(&self, field: &'static str) -> Result<i64, DecodeError> {
        match self {
            Self::Int(i) => Ok(*i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
            Self::Float(f) => Err(DecodeError::NotNumeric {
                field,
                value: f.to_string(),
            }),
            Self::Text(s) => s.trim().parse().map_err(|_| DecodeError::NotNumeric {
                field,
                value: s.clone(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TradeEvent {
    #[serde(rename = "E")]
    event_time: Option<Numeric>,
    #[serde(rename = "T")]
    trade_time: Option<Numeric>,
    #[serde(rename = "s")]
    symbol: Option<String>,
    #[serde(rename = "p", alias = "price")]
    price: Option<Numeric>,
    #[serde(rename = "q", alias = "qty")]
    quantity: Option<Numeric>,
}

/// Decoder for Binance trade events.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinanceTradeCodec;

impl BinanceTradeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame received on `symbol`'s stream.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed JSON, missing or non-numeric
    /// fields, or values that violate the tick invariants.
    pub fn decode_trade(&self, text: &str, symbol: &str) -> Result<Tick, DecodeError> {
        let mut value: Value = serde_json::from_str(text)?;
        if let Some(inner) = value.get_mut("data").filter(|d| d.is_object()) {
            value = inner.take();
        }
        let event: TradeEvent = serde_json::from_value(value)?;

        let timestamp_ms = Self::event_millis(&event)?;
        let price = event
            .price
            .as_ref()
            .ok_or(DecodeError::MissingField("p"))?
            .to_f64("p")?;
        let quantity = event
            .quantity
            .as_ref()
            .ok_or(DecodeError::MissingField("q"))?
            .to_f64("q")?;
        let symbol = event
            .symbol
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(symbol);

        Ok(Tick::new(timestamp_ms, symbol, price, quantity)?)
    }

    fn event_millis(event: &TradeEvent) -> Result<i64, DecodeError> {
        let event_time = event
            .event_time
            .as_ref()
            .map(|n| n.to_millis("E"))
            .transpose()?
            .filter(|ts| *ts != 0);
        if let Some(ts) = event_time {
            return Ok(ts);
        }
        event
            .trade_time
            .as_ref()
            .map(|n| n.to_millis("T"))
            .transpose()?
            .filter(|ts| *ts != 0)
            .ok_or(DecodeError::MissingField("E"))
    }
}

impl TickDecoder for BinanceTradeCodec {
    fn decode(&self, payload: &str, symbol: &str) -> Result<Tick, DecodeError> {
        self.decode_trade(payload, symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tick::TickError;
    use test_case::test_case;

    const TRADE: &str = r#"{"e":"trade","E":1700000000123,"s":"BTCUSDT","t":1,"p":"37000.10","q":"0.005","T":1700000000120,"m":true}"#;

    #[test]
    fn decodes_trade_event() {
        let tick = BinanceTradeCodec::new().decode_trade(TRADE, "btcusdt").unwrap();
        assert_eq!(tick.timestamp_ms(), 1_700_000_000_123);
        assert_eq!(tick.symbol(), "BTCUSDT");
        assert!((tick.price() - 37_000.10).abs() < 1e-9);
        assert!((tick.quantity() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn falls_back_to_trade_time_and_subscribed_symbol() {
        let text = r#"{"E":0,"T":1700000000120,"p":1.5,"q":2}"#;
        let tick = BinanceTradeCodec::new().decode_trade(text, "ethusdt").unwrap();
        assert_eq!(tick.timestamp_ms(), 1_700_000_000_120);
        assert_eq!(tick.symbol(), "ETHUSDT");
        assert!((tick.quantity() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_field_names_accepted() {
        let text = r#"{"E":5,"price":"10","qty":"1"}"#;
        let tick = BinanceTradeCodec::new().decode_trade(text, "x").unwrap();
        assert!((tick.price() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unwraps_combined_stream_envelope() {
        let text = format!(r#"{{"stream":"btcusdt@trade","data":{TRADE}}}"#);
        let tick = BinanceTradeCodec::new().decode_trade(&text, "btcusdt").unwrap();
        assert_eq!(tick.timestamp_ms(), 1_700_000_000_123);
    }

    #[test_case("not json" ; "malformed")]
    #[test_case(r#"{"result":null,"id":1}"# ; "subscription ack")]
    #[test_case(r#"{"E":1,"q":"1"}"# ; "missing price")]
    #[test_case(r#"{"p":"1","q":"1"}"# ; "missing time")]
    #[test_case(r#"{"E":0,"T":0,"p":"1","q":"1"}"# ; "zero time")]
    #[test_case(r#"{"E":1,"p":"abc","q":"1"}"# ; "non numeric price")]
    #[test_case(r#"[1,2,3]"# ; "array")]
    fn rejects(text: &str) {
        assert!(BinanceTradeCodec::new().decode_trade(text, "btcusdt").is_err());
    }

    #[test]
    fn non_positive_price_is_invalid_tick() {
        let text = r#"{"E":1,"p":"0","q":"1"}"#;
        let err = BinanceTradeCodec::new().decode_trade(text, "btcusdt").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTick(TickError::InvalidPrice(_))));
    }

    #[test]
    fn negative_quantity_is_invalid_tick() {
        let text = r#"{"E":1,"p":"1","q":"-1"}"#;
        let err = BinanceTradeCodec::new().decode_trade(text, "btcusdt").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTick(TickError::InvalidQuantity(_))));
    }

    #[test]
    fn missing_field_is_named() {
        let err = BinanceTradeCodec::new()
            .decode_trade(r#"{"E":1,"p":"1"}"#, "btcusdt")
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("q")));
    }
}
