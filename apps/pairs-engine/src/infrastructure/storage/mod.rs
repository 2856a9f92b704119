//! SQLite Tick Store
//!
//! Append-only tick log in a single SQLite table, plus on-demand resampling
//! into OHLCV bars.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE ticks (timestamp_ms INTEGER, symbol TEXT, price REAL, quantity REAL);
//! CREATE INDEX idx_ticks_symbol_ts ON ticks(symbol, timestamp_ms);
//! ```
//!
//! # Concurrency
//!
//! File-backed stores run in WAL mode. Appends serialize on one writer
//! connection for the duration of a single autocommit insert; reads use a
//! small pool of read-only connections and never wait for the writer.
//! In-memory stores share the writer connection for reads.
//!
//! Ties on `timestamp_ms` are returned in insertion (`rowid`) order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, params, params_from_iter};

use crate::application::ports::{BarSource, TickSink};
use crate::domain::bar::{Bar, BucketWidth, Timeframe, aggregate};
use crate::domain::tick::{Tick, normalize_symbol};
use crate::error::{QueryError, StorageError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS ticks (
        timestamp_ms INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        price REAL NOT NULL,
        quantity REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_ticks_symbol_ts ON ticks(symbol, timestamp_ms);
";

const INSERT_TICK: &str =
    "INSERT INTO ticks (timestamp_ms, symbol, price, quantity) VALUES (?1, ?2, ?3, ?4)";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle read connections kept for reuse.
const MAX_IDLE_READERS: usize = 8;

/// Durable, append-only tick log.
pub struct TickStore {
    writer: Mutex<Connection>,
    readers: Option<ReaderPool>,
}

struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let pooled = self.idle.lock().pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => {
                let conn = Connection::open_with_flags(
                    &self.path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                conn
            }
        };

        let result = f(&conn);

        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
        result
    }
}

impl std::fmt::Debug for TickStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickStore")
            .field("path", &self.readers.as_ref().map(|r| r.path.display().to_string()))
            .finish_non_exhaustive()
    }
}

impl TickStore {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory or database cannot be
    /// created or the schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!(path = %path.display(), journal_mode = %mode, "tick store opened");

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Some(ReaderPool {
                path: path.to_path_buf(),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Private in-memory store, for tests and tooling.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if SQLite cannot allocate the database.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            writer: Mutex::new(conn),
            readers: None,
        })
    }

    /// Durably record one tick.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the insert fails.
    pub fn append(&self, tick: &Tick) -> Result<(), StorageError> {
        let conn = self.writer.lock();
        conn.prepare_cached(INSERT_TICK)?.execute(params![
            tick.timestamp_ms(),
            tick.symbol(),
            tick.price(),
            tick.quantity(),
        ])?;
        Ok(())
    }

    /// Ticks for `symbols` in `[since_ms, until_ms)`, ordered by timestamp
    /// then insertion.
    ///
    /// Symbols are matched case-insensitively. No symbols or an empty range
    /// gives an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the read fails or a stored row is invalid.
    pub fn fetch<I, S>(
        &self,
        symbols: I,
        since_ms: i64,
        until_ms: i64,
    ) -> Result<Vec<Tick>, StorageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols: Vec<String> = symbols
            .into_iter()
            .map(|s| normalize_symbol(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        symbols.sort();
        symbols.dedup();
        if symbols.is_empty() || since_ms >= until_ms {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; symbols.len()].join(", ");
        let sql = format!(
            "SELECT timestamp_ms, symbol, price, quantity FROM ticks \
             WHERE symbol IN ({placeholders}) AND timestamp_ms >= ? AND timestamp_ms < ? \
             ORDER BY timestamp_ms, rowid"
        );
        let mut bind: Vec<Value> = symbols.into_iter().map(Value::Text).collect();
        bind.push(Value::Integer(since_ms));
        bind.push(Value::Integer(until_ms));

        self.read(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?;

            let mut ticks = Vec::new();
            for row in rows {
                let (ts, symbol, price, quantity) = row?;
                ticks.push(Tick::new(ts, &symbol, price, quantity)?);
            }
            Ok(ticks)
        })
    }

    /// Epoch-aligned OHLCV bars for `symbol` over `[since_ms, until_ms)`.
    ///
    /// Buckets without ticks are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidBucketWidth`] for widths below 1 ms and
    /// [`QueryError::Storage`] if the read fails.
    pub fn resample(
        &self,
        symbol: &str,
        since_ms: i64,
        until_ms: i64,
        width: Duration,
    ) -> Result<Vec<Bar>, QueryError> {
        let width = BucketWidth::new(width)?;
        let ticks = self.fetch([symbol], since_ms, until_ms)?;
        Ok(aggregate(&ticks, width))
    }

    /// Bars for `symbol` over the `lookback` ending now.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Storage`] if the read fails.
    pub fn resample_recent(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: Duration,
    ) -> Result<Vec<Bar>, QueryError> {
        let now = Utc::now().timestamp_millis();
        let lookback_ms = i64::try_from(lookback.as_millis()).unwrap_or(i64::MAX);
        self.resample(
            symbol,
            now.saturating_sub(lookback_ms),
            now.saturating_add(1),
            timeframe.duration(),
        )
    }

    /// Number of stored ticks for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the read fails.
    pub fn count(&self, symbol: &str) -> Result<u64, StorageError> {
        let symbol = normalize_symbol(symbol);
        self.read(|conn| {
            let n: i64 = conn
                .prepare_cached("SELECT COUNT(*) FROM ticks WHERE symbol = ?1")?
                .query_row(params![symbol], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        match &self.readers {
            Some(pool) => pool.with(f),
            None => f(&self.writer.lock()),
        }
    }
}

impl TickSink for TickStore {
    fn append(&self, tick: &Tick) -> Result<(), StorageError> {
        Self::append(self, tick)
    }
}

impl BarSource for TickStore {
    fn resample(
        &self,
        symbol: &str,
        since_ms: i64,
        until_ms: i64,
        width: Duration,
    ) -> Result<Vec<Bar>, QueryError> {
        Self::resample(self, symbol, since_ms, until_ms, width)
    }
}
