//! Error Taxonomy
//!
//! Every failure the engine can report, grouped by how callers are expected
//! to react to it.
//!
//! | Error | Raised by | Caller reaction |
//! |-------|-----------|-----------------|
//! | [`DecodeError`] | feed codec | discard the message, count it, continue |
//! | [`ConnectionError`] | feed sessions | back off and reconnect |
//! | [`StorageError`] | tick store | that write failed; later writes proceed |
//! | [`QueryError`] | store reads, analytics | surface immediately, never retried |
//!
//! Insufficient data is deliberately *not* an error: analytics encode it as
//! `NaN` and the store as an empty result.

use std::time::Duration;

use crate::domain::tick::TickError;

/// A feed message that could not be turned into a valid tick.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not the JSON shape the codec expects.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field required to build a tick is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but not a number.
    #[error("field {field} is not numeric: {value}")]
    NotNumeric {
        /// Field name on the wire.
        field: &'static str,
        /// Raw value received.
        value: String,
    },

    /// All fields present but the tick violates its invariants.
    #[error("invalid tick: {0}")]
    InvalidTick(#[from] TickError),
}

/// Transport-level failure of a feed connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The connection attempt did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No pong or data arrived within the heartbeat timeout.
    #[error("heartbeat timed out after {0:?}")]
    HeartbeatTimeout(Duration),

    /// The server closed the stream.
    #[error("connection closed by server")]
    Closed,

    /// WebSocket protocol or I/O error while connected.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Failure to write to or read from the tick log.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// SQLite reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row no longer satisfies the tick invariants.
    #[error("corrupt row: {0}")]
    CorruptRow(#[from] TickError),
}

/// Invalid arguments to a query or analytics function.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Two series passed to a pairwise operation have different timestamps.
    #[error("series are not aligned: {left} vs {right} points")]
    Misaligned {
        /// Length of the first series.
        left: usize,
        /// Length of the second series.
        right: usize,
    },

    /// Rolling window must hold at least one observation.
    #[error("rolling window must be positive")]
    ZeroWindow,

    /// Resample bucket width must be at least one millisecond.
    #[error("bucket width must be at least 1ms, got {0:?}")]
    InvalidBucketWidth(Duration),

    /// Unrecognised timeframe string.
    #[error("unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    /// Entry/exit thresholds are not usable.
    #[error("invalid thresholds: entry {entry}, exit {exit}")]
    InvalidThresholds {
        /// Entry threshold.
        entry: f64,
        /// Exit threshold.
        exit: f64,
    },

    /// The underlying store failed while serving the query.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_from_tungstenite() {
        let err: ConnectionError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, ConnectionError::Transport(_)));
    }

    #[test]
    fn misaligned_message_mentions_lengths() {
        let err = QueryError::Misaligned { left: 3, right: 5 };
        assert_eq!(err.to_string(), "series are not aligned: 3 vs 5 points");
    }

    #[test]
    fn decode_error_wraps_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = DecodeError::from(json_err);
        assert!(err.to_string().starts_with("malformed payload"));
    }
}
