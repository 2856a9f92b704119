//! Stream Connection
//!
//! Drives one feed session for one symbol: connect, decode every payload,
//! hand each valid tick to the sink in arrival order. A bad payload is
//! counted and skipped; only transport failures end a run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedConnector, FeedSession, TickDecoder, TickSink};
use crate::domain::connection::{ConnectionState, ConnectionStatus};
use crate::error::ConnectionError;
use crate::infrastructure::metrics;

/// How a [`StreamConnection::run`] call ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The cancellation token fired. Do not reconnect.
    Stopped,
    /// The connection failed or dropped. Back off and reconnect.
    Failed {
        /// What went wrong.
        error: ConnectionError,
        /// Whether the session had been established before failing.
        was_connected: bool,
    },
}

/// Collaborators shared by every connection of one supervisor.
#[derive(Clone)]
pub struct FeedPipeline {
    /// Opens feed sessions.
    pub connector: Arc<dyn FeedConnector>,
    /// Turns payloads into ticks.
    pub decoder: Arc<dyn TickDecoder>,
    /// Receives decoded ticks.
    pub sink: Arc<dyn TickSink>,
}

impl std::fmt::Debug for FeedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPipeline").finish_non_exhaustive()
    }
}

/// One symbol's connection to the feed.
#[derive(Debug)]
pub struct StreamConnection {
    pipeline: FeedPipeline,
    status: Arc<ConnectionStatus>,
    connect_timeout: Duration,
}

impl StreamConnection {
    /// Create a connection reporting into `status`.
    #[must_use]
    pub const fn new(
        pipeline: FeedPipeline,
        status: Arc<ConnectionStatus>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            status,
            connect_timeout,
        }
    }

    /// Symbol this connection streams.
    #[must_use]
    pub fn symbol(&self) -> &str {
        self.status.symbol()
    }

    /// Shared status handle.
    #[must_use]
    pub const fn status(&self) -> &Arc<ConnectionStatus> {
        &self.status
    }

    /// Connect and stream until `cancel` fires or the connection fails.
    ///
    /// A connect that takes longer than the configured timeout counts as a
    /// failure. Cancellation is observed while connecting and between
    /// payloads; no tick is appended once `cancel` has fired.
    pub async fn run(&self, cancel: &CancellationToken) -> RunOutcome {
        let symbol = self.symbol();
        tracing::debug!(symbol = %symbol, "connecting to feed");

        let connect =
            tokio::time::timeout(self.connect_timeout, self.pipeline.connector.connect(symbol));
        let mut session = tokio::select! {
            biased;
            () = cancel.cancelled() => return RunOutcome::Stopped,
            result = connect => match result {
                Ok(Ok(session)) => session,
                Ok(Err(error)) => {
                    return RunOutcome::Failed { error, was_connected: false };
                }
                Err(_) => {
                    return RunOutcome::Failed {
                        error: ConnectionError::ConnectTimeout(self.connect_timeout),
                        was_connected: false,
                    };
                }
            },
        };

        transition(&self.status, ConnectionState::Connected);
        tracing::info!(symbol = %symbol, "feed connected");

        let outcome = self.stream(session.as_mut(), cancel).await;
        if matches!(outcome, RunOutcome::Stopped) {
            session.close().await;
        }
        outcome
    }

    async fn stream(
        &self,
        session: &mut dyn FeedSession,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return RunOutcome::Stopped,
                payload = session.next_payload() => match payload {
                    Ok(text) => self.handle_payload(&text, cancel),
                    Err(error) => {
                        return RunOutcome::Failed { error, was_connected: true };
                    }
                },
            }
        }
    }

    fn handle_payload(&self, payload: &str, cancel: &CancellationToken) {
        let symbol = self.symbol();
        let tick = match self.pipeline.decoder.decode(payload, symbol) {
            Ok(tick) => tick,
            Err(e) => {
                tracing::debug!(symbol = %symbol, error = %e, "discarding feed message");
                self.status.record_discard();
                metrics::record_discard(symbol);
                return;
            }
        };

        if cancel.is_cancelled() {
            return;
        }

        let started = Instant::now();
        match self.pipeline.sink.append(&tick) {
            Ok(()) => {
                metrics::record_append_duration(started.elapsed());
                self.status.record_tick();
                metrics::record_tick(symbol);
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "failed to store tick");
                self.status.record_storage_failure();
                metrics::record_storage_failure(symbol);
            }
        }
    }
}

/// Apply a state change and mirror it into logs and metrics.
pub(crate) fn transition(status: &ConnectionStatus, to: ConnectionState) {
    if let Some(from) = status.set_state(to) {
        metrics::record_transition(from, to);
        tracing::debug!(
            symbol = %status.symbol(),
            from = from.as_str(),
            to = to.as_str(),
            "connection state changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::MockTickSink;
    use crate::domain::tick::Tick;
    use crate::error::{DecodeError, StorageError};

    /// Decodes `"<ts>,<price>,<qty>"`.
    struct CsvDecoder;

    impl TickDecoder for CsvDecoder {
        fn decode(&self, payload: &str, symbol: &str) -> Result<Tick, DecodeError> {
            let mut parts = payload.split(',');
            let mut field = |name| {
                parts
                    .next()
                    .and_then(|p| p.parse::<f64>().ok())
                    .ok_or(DecodeError::MissingField(name))
            };
            #[allow(clippy::cast_possible_truncation)]
            let ts = field("ts")? as i64;
            let price = field("price")?;
            let qty = field("qty")?;
            Ok(Tick::new(ts, symbol, price, qty)?)
        }
    }

    struct ScriptedSession {
        script: VecDeque<Result<String, ConnectionError>>,
    }

    #[async_trait]
    impl FeedSession for ScriptedSession {
        async fn next_payload(&mut self) -> Result<String, ConnectionError> {
            match self.script.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {}
    }

    struct ScriptedConnector {
        script: Mutex<Option<Vec<Result<String, ConnectionError>>>>,
    }

    #[async_trait]
    impl FeedConnector for ScriptedConnector {
        async fn connect(&self, _symbol: &str) -> Result<Box<dyn FeedSession>, ConnectionError> {
            let script = self
                .script
                .lock()
                .take()
                .ok_or_else(|| ConnectionError::ConnectFailed("refused".to_string()))?;
            Ok(Box::new(ScriptedSession {
                script: script.into(),
            }))
        }
    }

    struct HangingConnector;

    #[async_trait]
    impl FeedConnector for HangingConnector {
        async fn connect(&self, _symbol: &str) -> Result<Box<dyn FeedSession>, ConnectionError> {
            std::future::pending().await
        }
    }

    fn connection(
        connector: Arc<dyn FeedConnector>,
        sink: Arc<dyn TickSink>,
    ) -> StreamConnection {
        StreamConnection::new(
            FeedPipeline {
                connector,
                decoder: Arc::new(CsvDecoder),
                sink,
            },
            Arc::new(ConnectionStatus::new("BTCUSDT".to_string())),
            Duration::from_millis(50),
        )
    }

    fn scripted(items: Vec<Result<String, ConnectionError>>) -> Arc<ScriptedConnector> {
        Arc::new(ScriptedConnector {
            script: Mutex::new(Some(items)),
        })
    }

    #[tokio::test]
    async fn bad_messages_are_discarded_and_stream_continues() {
        let mut sink = MockTickSink::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        sink.expect_append().times(2).returning(move |tick| {
            seen_clone.lock().push(tick.price());
            Ok(())
        });

        let conn = connection(
            scripted(vec![
                Ok("1000,10.0,1.0".to_string()),
                Ok("not a tick".to_string()),
                Ok("2000,-5.0,1.0".to_string()),
                Ok("3000,11.0,0.5".to_string()),
                Err(ConnectionError::Closed),
            ]),
            Arc::new(sink),
        );

        let outcome = conn.run(&CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                error: ConnectionError::Closed,
                was_connected: true
            }
        ));
        assert_eq!(*seen.lock(), vec![10.0, 11.0]);

        let snap = conn.status().snapshot();
        assert_eq!(snap.ticks_received, 2);
        assert_eq!(snap.messages_discarded, 2);
        assert_eq!(snap.state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn storage_failure_is_counted_not_fatal() {
        let mut sink = MockTickSink::new();
        let mut calls = 0;
        sink.expect_append().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(StorageError::Io(std::io::Error::other("disk full")))
            } else {
                Ok(())
            }
        });

        let conn = connection(
            scripted(vec![
                Ok("1000,10.0,1.0".to_string()),
                Ok("2000,10.5,1.0".to_string()),
                Err(ConnectionError::Closed),
            ]),
            Arc::new(sink),
        );

        let _ = conn.run(&CancellationToken::new()).await;
        let snap = conn.status().snapshot();
        assert_eq!(snap.storage_failures, 1);
        assert_eq!(snap.ticks_received, 1);
    }

    #[tokio::test]
    async fn connect_failure_reports_not_connected() {
        let connector = Arc::new(ScriptedConnector {
            script: Mutex::new(None),
        });
        let conn = connection(connector, Arc::new(MockTickSink::new()));

        let outcome = conn.run(&CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                error: ConnectionError::ConnectFailed(_),
                was_connected: false
            }
        ));
    }

    #[tokio::test]
    async fn wedged_connect_times_out() {
        let conn = connection(Arc::new(HangingConnector), Arc::new(MockTickSink::new()));
        let outcome = conn.run(&CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                error: ConnectionError::ConnectTimeout(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_idle_stream() {
        let conn = connection(scripted(vec![]), Arc::new(MockTickSink::new()));
        let cancel = CancellationToken::new();

        let child = cancel.clone();
        let handle = tokio::spawn(async move { conn.run(&child).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped));
    }

    #[tokio::test]
    async fn cancelled_before_connect_returns_stopped() {
        let conn = connection(Arc::new(HangingConnector), Arc::new(MockTickSink::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(conn.run(&cancel).await, RunOutcome::Stopped));
    }
}
