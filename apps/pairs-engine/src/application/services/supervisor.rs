//! Ingestion Supervisor
//!
//! Owns one worker task per symbol. Each worker runs a
//! [`StreamConnection`] in a loop, backing off between failures, until its
//! cancellation token fires. Workers never share state except the tick
//! sink, so one symbol's failures or backoff never delay another.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!                     ▲              │ error
//!                     │              ▼
//!                     └──────── Backoff(d)      any state ──stop──► Stopped
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::stream_connection::{FeedPipeline, RunOutcome, StreamConnection, transition};
use crate::domain::connection::{ConnectionSnapshot, ConnectionState, ConnectionStatus};
use crate::domain::tick::{Symbol, normalize_symbol};
use crate::infrastructure::binance::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::infrastructure::metrics;

/// Supervisor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Backoff between attempts.
    pub reconnect: ReconnectConfig,
    /// How long [`IngestionSupervisor::stop`] waits before abandoning workers.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

struct Worker {
    status: Arc<ConnectionStatus>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps exactly one feed connection per requested symbol alive.
pub struct IngestionSupervisor {
    pipeline: FeedPipeline,
    config: SupervisorConfig,
    runtime: Handle,
    workers: Mutex<BTreeMap<Symbol, Worker>>,
    /// Workers for removed symbols that may still be winding down.
    retiring: Mutex<Vec<Worker>>,
    /// Held by a worker for its whole lifetime.
    slots: Mutex<BTreeMap<Symbol, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for IngestionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionSupervisor")
            .field("config", &self.config)
            .field("symbols", &self.symbols())
            .finish_non_exhaustive()
    }
}

impl IngestionSupervisor {
    /// Create a supervisor that spawns its workers on `runtime`.
    #[must_use]
    pub fn new(pipeline: FeedPipeline, config: SupervisorConfig, runtime: Handle) -> Self {
        Self {
            pipeline,
            config,
            runtime,
            workers: Mutex::new(BTreeMap::new()),
            retiring: Mutex::new(Vec::new()),
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Make the running symbol set equal to `symbols`.
    ///
    /// Symbols are normalized to upper case; blanks are ignored. Symbols no
    /// longer requested are signalled to stop, new ones are started, and
    /// symbols already running are left alone. Returns immediately.
    pub fn start<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<Symbol> = symbols
            .into_iter()
            .map(|s| normalize_symbol(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();

        let mut workers = self.workers.lock();

        let removed: Vec<Symbol> = workers
            .keys()
            .filter(|s| !wanted.contains(*s))
            .cloned()
            .collect();
        for symbol in removed {
            if let Some(worker) = workers.remove(&symbol) {
                tracing::info!(symbol = %symbol, "stopping feed for removed symbol");
                worker.cancel.cancel();
                self.retiring.lock().push(worker);
            }
        }

        for symbol in wanted {
            if !workers.contains_key(&symbol) {
                tracing::info!(symbol = %symbol, "starting feed");
                let worker = self.spawn_worker(symbol.clone());
                workers.insert(symbol, worker);
            }
        }
        drop(workers);

        self.retiring.lock().retain(|w| !w.handle.is_finished());
        self.prune_slots();
    }

    /// Stop every worker and wait for them to finish.
    ///
    /// Workers still running after the grace period are aborted. Calling
    /// `stop` again is a no-op.
    pub async fn stop(&self) {
        let mut stopping: Vec<Worker> = std::mem::take(&mut *self.workers.lock())
            .into_values()
            .collect();
        stopping.append(&mut self.retiring.lock());
        if stopping.is_empty() {
            return;
        }

        tracing::info!(workers = stopping.len(), "stopping ingestion");
        for worker in &stopping {
            worker.cancel.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        for mut worker in stopping {
            if tokio::time::timeout_at(deadline, &mut worker.handle)
                .await
                .is_err()
            {
                tracing::warn!(
                    symbol = %worker.status.symbol(),
                    "abandoning unresponsive feed worker"
                );
                worker.handle.abort();
                let _ = worker.handle.await;
            }
            transition(&worker.status, ConnectionState::Stopped);
        }
        self.prune_slots();
        tracing::info!("ingestion stopped");
    }

    /// True while any worker has outstanding work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.workers
            .lock()
            .values()
            .any(|w| w.status.state().is_active())
    }

    /// Symbols currently requested, in order.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.workers.lock().keys().cloned().collect()
    }

    /// Live status handles, ordered by symbol.
    #[must_use]
    pub fn statuses(&self) -> Vec<Arc<ConnectionStatus>> {
        self.workers
            .lock()
            .values()
            .map(|w| Arc::clone(&w.status))
            .collect()
    }

    /// Point-in-time status of every requested symbol.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.statuses().iter().map(|s| s.snapshot()).collect()
    }

    /// Drop slots no worker holds any more.
    fn prune_slots(&self) {
        self.slots.lock().retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    fn spawn_worker(&self, symbol: Symbol) -> Worker {
        let status = Arc::new(ConnectionStatus::new(symbol.clone()));
        transition(&status, ConnectionState::Connecting);

        let slot = Arc::clone(self.slots.lock().entry(symbol).or_default());
        let cancel = CancellationToken::new();
        let connection = StreamConnection::new(
            self.pipeline.clone(),
            Arc::clone(&status),
            self.config.connect_timeout,
        );

        let handle = self.runtime.spawn(supervise(
            connection,
            slot,
            cancel.clone(),
            self.config.reconnect.clone(),
        ));

        Worker {
            status,
            cancel,
            handle,
        }
    }
}

/// One symbol's reconnect loop.
async fn supervise(
    connection: StreamConnection,
    slot: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
    reconnect: ReconnectConfig,
) {
    let status = Arc::clone(connection.status());
    let symbol = status.symbol().to_string();

    // A previous worker for this symbol may still be winding down.
    let _slot = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            transition(&status, ConnectionState::Stopped);
            return;
        }
        guard = slot.lock_owned() => guard,
    };

    let mut policy = ReconnectPolicy::new(reconnect);
    loop {
        transition(&status, ConnectionState::Connecting);

        let (error, was_connected) = match connection.run(&cancel).await {
            RunOutcome::Stopped => break,
            RunOutcome::Failed {
                error,
                was_connected,
            } => (error, was_connected),
        };

        if was_connected {
            policy.reset();
        }
        let delay = policy.next_delay();
        tracing::warn!(
            symbol = %symbol,
            error = %error,
            attempt = policy.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "feed connection failed, backing off"
        );
        status.set_error(error.to_string());
        transition(&status, ConnectionState::Backoff(delay));

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        status.record_reconnect();
        metrics::record_reconnect(&symbol);
    }

    transition(&status, ConnectionState::Stopped);
    tracing::info!(symbol = %symbol, "feed stopped");
}
