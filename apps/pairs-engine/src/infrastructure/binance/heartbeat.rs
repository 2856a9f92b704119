//! Heartbeat Monitor
//!
//! Keeps an idle WebSocket honest: after `ping_interval` without inbound
//! traffic a ping is due, and if nothing at all arrives within
//! `pong_timeout` of that ping the connection is declared dead.
//!
//! The monitor is a plain state machine polled from the session's receive
//! loop, so it needs no task or channel of its own. Any inbound frame
//! counts as a pong.

use std::time::Duration;

use tokio::time::Instant;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Idle time before a ping is sent.
    pub ping_interval: Duration,
    /// Time allowed for any reply after a ping.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }
}

/// What the session should do when the heartbeat deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing yet; wait for the next deadline.
    Idle,
    /// Send a ping now.
    SendPing,
    /// No reply to the last ping; drop the connection.
    TimedOut,
}

/// Per-connection heartbeat state.
#[derive(Debug)]
pub struct Heartbeat {
    config: HeartbeatConfig,
    last_activity: Instant,
    ping_sent_at: Option<Instant>,
}

impl Heartbeat {
    /// Fresh monitor; the connection counts as active at `now`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_activity: now,
            ping_sent_at: None,
        }
    }

    /// Configured pong timeout.
    #[must_use]
    pub const fn pong_timeout(&self) -> Duration {
        self.config.pong_timeout
    }

    /// Record inbound traffic at `now`.
    pub const fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.ping_sent_at = None;
    }

    /// True while a ping is unanswered.
    #[must_use]
    pub const fn is_waiting_for_pong(&self) -> bool {
        self.ping_sent_at.is_some()
    }

    /// When [`poll`](Self::poll) next has something to do.
    #[must_use]
    pub fn next_deadline(&self) -> Instant {
        self.ping_sent_at.map_or_else(
            || self.last_activity + self.config.ping_interval,
            |sent| sent + self.config.pong_timeout,
        )
    }

    /// Advance to `now`. Returns [`HeartbeatAction::SendPing`] at most once
    /// per idle period; the ping is assumed sent.
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if now < self.next_deadline() {
            return HeartbeatAction::Idle;
        }
        if self.ping_sent_at.is_some() {
            HeartbeatAction::TimedOut
        } else {
            self.ping_sent_at = Some(now);
            HeartbeatAction::SendPing
        }
    }
}
