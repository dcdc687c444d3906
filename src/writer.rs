//! Upserts with retry, backoff and connection replacement.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::{LoadError, Result};
use crate::row::{Row, TableSpec};
use crate::store::{ConnectionHolder, StoreError};

/// Substrings of store errors that mean the connection or the server hiccuped
/// rather than the data being rejected. Matched case-insensitively.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "ConnectionTerminated",
    "RemoteProtocolError",
    "ReadTimeout",
    "WriteTimeout",
    "ConnectTimeout",
    "Server disconnected",
    "502",
    "503",
    "504",
    "connection reset",
    "connection closed",
    "connection error",
    "timed out",
    "database is locked",
];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

pub fn is_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_ascii_lowercase()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

impl FailureKind {
    pub fn classify(err: &StoreError) -> Self {
        if is_transient(err.message()) {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }
}

/// `min(max_delay, 2^attempt)` seconds plus `jitter` seconds.
pub fn backoff_delay(attempt: u32, max_delay: Duration, jitter: f64) -> Duration {
    let exp = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    let base = Duration::from_secs(exp).min(max_delay);
    base + Duration::from_secs_f64(jitter.clamp(0.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        backoff_delay(attempt, self.max_delay, jitter)
    }
}

pub trait Sleeper {
    fn sleep(&mut self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Applied,
    Transient(String),
}

/// One try at writing a batch. `delay` is the backoff slept after it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttempt {
    pub attempt: u32,
    pub delay: Option<Duration>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub rows: usize,
    pub attempts: Vec<WriteAttempt>,
    pub reported_rows: Option<usize>,
}

impl WriteReport {
    pub fn retries(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }
}

pub struct ResilientWriter<S: Sleeper = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
}

impl ResilientWriter<ThreadSleeper> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, ThreadSleeper)
    }
}

impl<S: Sleeper> ResilientWriter<S> {
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Upserts `rows` into `table`. Transient failures replace the connection,
    /// back off and retry until the attempt budget runs out. The sleep after
    /// the k-th failed attempt (zero-based) is `min(max_delay, 2^k)` plus jitter.
    pub fn write(
        &mut self,
        conn: &mut ConnectionHolder,
        table: &TableSpec,
        rows: &[Row],
    ) -> Result<WriteReport> {
        let mut report = WriteReport {
            rows: rows.len(),
            ..WriteReport::default()
        };
        if rows.is_empty() {
            return Ok(report);
        }

        let max = self.policy.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match conn.store().upsert(table, rows) {
                Ok(resp) => {
                    report.reported_rows = resp.reported_rows;
                    report.attempts.push(WriteAttempt {
                        attempt,
                        delay: None,
                        outcome: AttemptOutcome::Applied,
                    });
                    return Ok(report);
                }
                Err(err) => err,
            };

            if FailureKind::classify(&err) == FailureKind::Permanent {
                error!(
                    table = table.name,
                    rows = rows.len(),
                    attempt = %format!("{attempt}/{max}"),
                    error = %err,
                    "permanent write failure"
                );
                return Err(LoadError::PermanentWrite {
                    table: table.name.to_string(),
                    rows: rows.len(),
                    attempt,
                    message: err.message().to_string(),
                });
            }

            if attempt >= max {
                error!(
                    table = table.name,
                    rows = rows.len(),
                    attempt = %format!("{attempt}/{max}"),
                    error = %err,
                    "retries exhausted"
                );
                return Err(LoadError::TransientWrite {
                    table: table.name.to_string(),
                    rows: rows.len(),
                    attempts: attempt,
                    message: err.message().to_string(),
                });
            }

            // Backoff exponent is the zero-based index of the failed attempt.
            let jitter = rand::thread_rng().gen_range(0.0..1.0);
            let delay = self.policy.delay_for(attempt - 1, jitter);
            warn!(
                table = table.name,
                rows = rows.len(),
                attempt = %format!("{attempt}/{max}"),
                delay_s = delay.as_secs_f64(),
                error = %err,
                "transient write failure, reconnecting"
            );
            report.attempts.push(WriteAttempt {
                attempt,
                delay: Some(delay),
                outcome: AttemptOutcome::Transient(err.message().to_string()),
            });
            // A failed reconnect keeps the old connection and spends this
            // attempt; the next upsert decides whether the store is back.
            if let Err(err) = conn.replace() {
                warn!(
                    table = table.name,
                    attempt = %format!("{attempt}/{max}"),
                    error = %err,
                    "reconnect failed, keeping previous connection"
                );
            }
            self.sleeper.sleep(delay);
        }
    }
}

/// Where flushed rows go.
pub trait RowSink {
    fn write(&mut self, table: &TableSpec, rows: &[Row]) -> Result<()>;

    /// Stored row count for one partition of `table`. `None` when the sink
    /// cannot answer, e.g. a dry run.
    fn count(
        &mut self,
        _table: &TableSpec,
        _partition_id: i64,
    ) -> Option<std::result::Result<u64, StoreError>> {
        None
    }
}

/// Live destination: a replaceable store connection plus the retrying writer.
pub struct StoreSink<S: Sleeper = ThreadSleeper> {
    pub conn: ConnectionHolder,
    pub writer: ResilientWriter<S>,
}

impl<S: Sleeper> StoreSink<S> {
    pub fn new(conn: ConnectionHolder, writer: ResilientWriter<S>) -> Self {
        Self { conn, writer }
    }
}

impl<S: Sleeper> RowSink for StoreSink<S> {
    fn write(&mut self, table: &TableSpec, rows: &[Row]) -> Result<()> {
        self.writer.write(&mut self.conn, table, rows).map(|_| ())
    }

    fn count(
        &mut self,
        table: &TableSpec,
        partition_id: i64,
    ) -> Option<std::result::Result<u64, StoreError>> {
        let column = table.partition_column?;
        Some(self.conn.store().count(table.name, column, partition_id))
    }
}

/// Counts what would have been written.
#[derive(Debug, Clone, Default)]
pub struct DryRunSink {
    rows: BTreeMap<&'static str, usize>,
    calls: usize,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &BTreeMap<&'static str, usize> {
        &self.rows
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl RowSink for DryRunSink {
    fn write(&mut self, table: &TableSpec, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        *self.rows.entry(table.name).or_default() += rows.len();
        self.calls += 1;
        Ok(())
    }
}
