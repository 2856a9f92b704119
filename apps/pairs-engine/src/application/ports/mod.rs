//! Port Interfaces
//!
//! Contracts between the ingestion services and the adapters that talk to
//! the outside world, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`FeedConnector`] / [`FeedSession`]: a live upstream trade stream
//! - [`TickDecoder`]: turns one upstream payload into a [`Tick`]
//! - [`TickSink`]: durable destination for decoded ticks
//! - [`BarSource`]: resampled bars for the analytics service

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::bar::Bar;
use crate::domain::tick::Tick;
use crate::error::{ConnectionError, DecodeError, QueryError, StorageError};

/// Destination for decoded ticks.
///
/// Implementations must be safe to call concurrently from every symbol's
/// connection task and must not reorder ticks appended by one caller.
#[cfg_attr(test, mockall::automock)]
pub trait TickSink: Send + Sync {
    /// Durably record one tick.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the write failed. Later writes are
    /// unaffected.
    fn append(&self, tick: &Tick) -> Result<(), StorageError>;
}

/// Decodes upstream payloads for one feed format.
pub trait TickDecoder: Send + Sync {
    /// Decode `payload` received on the stream subscribed for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for anything that is not a valid trade.
    fn decode(&self, payload: &str, symbol: &str) -> Result<Tick, DecodeError>;
}

/// Opens per-symbol feed sessions.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a session streaming trades for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the connection cannot be established.
    async fn connect(&self, symbol: &str) -> Result<Box<dyn FeedSession>, ConnectionError>;
}

/// One established upstream connection.
#[async_trait]
pub trait FeedSession: Send {
    /// Wait for the next data payload.
    ///
    /// Transport housekeeping (pings, pongs, heartbeats) is handled inside
    /// the session and never surfaces here.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] once the connection is no longer usable.
    async fn next_payload(&mut self) -> Result<String, ConnectionError>;

    /// Close the connection politely. Errors are ignored.
    async fn close(&mut self);
}

/// Read side of the tick log, as seen by the analytics service.
#[cfg_attr(test, mockall::automock)]
pub trait BarSource: Send + Sync {
    /// Epoch-aligned bars for `symbol` over `[since_ms, until_ms)`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for an unusable width or a failed read.
    fn resample(
        &self,
        symbol: &str,
        since_ms: i64,
        until_ms: i64,
        width: Duration,
    ) -> Result<Vec<Bar>, QueryError>;
}
