//! Connection State Tracking
//!
//! Per-symbol lifecycle state and counters, shared between the supervisor
//! task that drives a connection and the observers that report on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::tick::Symbol;

/// Lifecycle state of one symbol's feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "delay_ms", rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not started yet.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Receiving messages.
    Connected,
    /// Waiting before the next attempt.
    Backoff(#[serde(serialize_with = "serialize_millis")] Duration),
    /// Terminal: stopped on request.
    Stopped,
}

impl ConnectionState {
    /// True while the supervisor still has work outstanding for the symbol.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Backoff(_))
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Backoff(_) => "backoff",
            Self::Stopped => "stopped",
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Live state and counters for one symbol.
#[derive(Debug)]
pub struct ConnectionStatus {
    symbol: Symbol,
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    ticks_received: AtomicU64,
    messages_discarded: AtomicU64,
    storage_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl ConnectionStatus {
    /// Fresh status in [`ConnectionState::Disconnected`].
    #[must_use]
    pub const fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            ticks_received: AtomicU64::new(0),
            messages_discarded: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    /// Symbol this status belongs to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Move to `state` and return the state it replaced.
    ///
    /// Entering `Connected` clears the last error. `Stopped` is terminal:
    /// once reached, further calls return `None` and change nothing.
    pub fn set_state(&self, state: ConnectionState) -> Option<ConnectionState> {
        let mut current = self.state.write();
        if *current == ConnectionState::Stopped {
            return None;
        }
        let previous = std::mem::replace(&mut *current, state);
        drop(current);

        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
        }
        Some(previous)
    }

    /// Record the most recent connection failure.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Count a tick handed to the store.
    pub fn record_tick(&self) {
        self.ticks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a message discarded by the decoder.
    pub fn record_discard(&self) {
        self.messages_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed store write.
    pub fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a reconnection attempt.
    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Ticks handed to the store so far.
    #[must_use]
    pub fn ticks_received(&self) -> u64 {
        self.ticks_received.load(Ordering::Relaxed)
    }

    /// Messages discarded so far.
    #[must_use]
    pub fn messages_discarded(&self) -> u64 {
        self.messages_discarded.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            symbol: self.symbol.clone(),
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            ticks_received: self.ticks_received(),
            messages_discarded: self.messages_discarded(),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of a [`ConnectionStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    /// Symbol.
    pub symbol: Symbol,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Last time the connection reached `Connected`.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent failure since the last successful connect.
    pub last_error: Option<String>,
    /// Ticks handed to the store.
    pub ticks_received: u64,
    /// Messages discarded by the decoder.
    pub messages_discarded: u64,
    /// Failed store writes.
    pub storage_failures: u64,
    /// Reconnection attempts.
    pub reconnect_attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(ConnectionState::Backoff(Duration::from_secs(1)).is_active());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(!ConnectionState::Stopped.is_active());
    }

    #[test]
    fn stopped_is_terminal() {
        let status = ConnectionStatus::new("BTCUSDT".to_string());
        assert_eq!(
            status.set_state(ConnectionState::Stopped),
            Some(ConnectionState::Disconnected)
        );
        assert_eq!(status.set_state(ConnectionState::Connecting), None);
        assert_eq!(status.state(), ConnectionState::Stopped);
    }

    #[test]
    fn connected_clears_error() {
        let status = ConnectionStatus::new("BTCUSDT".to_string());
        status.set_error("boom".to_string());
        status.set_state(ConnectionState::Connected);
        let snap = status.snapshot();
        assert!(snap.last_error.is_none());
        assert!(snap.last_connected_at.is_some());
    }

    #[test]
    fn counters_accumulate() {
        let status = ConnectionStatus::new("ETHUSDT".to_string());
        status.record_tick();
        status.record_tick();
        status.record_discard();
        status.record_storage_failure();
        status.record_reconnect();

        let snap = status.snapshot();
        assert_eq!(snap.ticks_received, 2);
        assert_eq!(snap.messages_discarded, 1);
        assert_eq!(snap.storage_failures, 1);
        assert_eq!(snap.reconnect_attempts, 1);
    }

    #[test]
    fn backoff_serializes_delay() {
        let json =
            serde_json::to_value(ConnectionState::Backoff(Duration::from_millis(1500))).unwrap();
        assert_eq!(json["state"], "backoff");
        assert_eq!(json["delay_ms"], 1500);

        let json = serde_json::to_value(ConnectionState::Connected).unwrap();
        assert_eq!(json["state"], "connected");
    }
}
