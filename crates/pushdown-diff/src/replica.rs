//! Replica readiness polling.
//!
//! Before comparing, the harness waits until the columnar replica of every
//! table under test reports itself available in
//! `information_schema.tiflash_replica`. The wait is a small state machine:
//!
//! ```text
//! Polling --probe "1"--------------> Ready
//! Polling --probe other value------> Polling (after one interval)
//! Polling --probe != 1 row---------> Failed(UnexpectedRowCount)
//! Polling --probe != 1 column------> Failed(UnexpectedColumnCount)
//! Polling --query/scan error-------> Failed(Query | Scan)
//! Polling --elapsed > timeout------> Failed(PollTimeout)
//! ```
//!
//! Time comes from a [`Clock`] so the timeout can be exercised without
//! sleeping.

use std::cell::Cell as StdCell;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::QueryCapability;
use crate::normalize::query_result_set;
use crate::{DiffError, DiffResult};

/// How long to wait for one replica before giving up.
pub const REPLICA_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Fixed pause between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Value of the `available` column once the replica is ready.
const AVAILABLE: &[u8] = b"1";

// ─── Clock ──────────────────────────────────────────────────────────────

/// Source of time for the poller.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time and real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// A clock that only moves when slept on.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: StdCell<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: StdCell::new(Duration::ZERO),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get().saturating_add(by));
    }

    /// Total time advanced so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

// ─── Probe ──────────────────────────────────────────────────────────────

/// Outcome of a single metadata probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Available,
    Pending,
}

/// Quote `s` as a SQL string literal.
fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// The metadata query asking whether `database.table`'s replica is ready.
#[must_use]
pub fn replica_status_sql(database: &str, table: &str) -> String {
    format!(
        "select available from information_schema.tiflash_replica where table_schema = {} and table_name = {}",
        sql_literal(database),
        sql_literal(table)
    )
}

/// Ask `backend` once whether `database.table`'s replica is available.
///
/// # Errors
///
/// - [`DiffError::UnexpectedRowCount`] unless exactly one row comes back.
/// - [`DiffError::UnexpectedColumnCount`] unless that row has one column.
/// - [`DiffError::Query`] / [`DiffError::Scan`] if the probe itself fails.
pub fn probe_replica<Q>(backend: &Q, database: &str, table: &str) -> DiffResult<ProbeStatus>
where
    Q: QueryCapability + ?Sized,
{
    let rs = query_result_set(backend, &replica_status_sql(database, table))?;
    if rs.len() != 1 {
        return Err(DiffError::UnexpectedRowCount {
            database: database.to_owned(),
            table: table.to_owned(),
            rows: rs.len(),
        });
    }
    if rs.width() != 1 {
        return Err(DiffError::UnexpectedColumnCount {
            database: database.to_owned(),
            table: table.to_owned(),
            columns: rs.width(),
        });
    }
    let ready = rs.rows()[0][0].as_bytes().is_some_and(|v| v == AVAILABLE);
    Ok(if ready {
        ProbeStatus::Available
    } else {
        ProbeStatus::Pending
    })
}

// ─── Poller ─────────────────────────────────────────────────────────────

/// Summary of a successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub database: String,
    pub table: String,
    /// Number of probes issued, the successful one included.
    pub attempts: u32,
    pub elapsed: Duration,
}

enum PollState {
    Polling { attempts: u32 },
    Ready(PollReport),
    Failed(DiffError),
}

/// Waits for replicas to become available.
#[derive(Debug, Clone)]
pub struct ReplicaPoller<C: Clock = SystemClock> {
    timeout: Duration,
    interval: Duration,
    clock: C,
}

impl ReplicaPoller<SystemClock> {
    /// A wall-clock poller with the default timeout and interval.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for ReplicaPoller<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> ReplicaPoller<C> {
    #[must_use]
    pub const fn with_clock(clock: C) -> Self {
        Self {
            timeout: REPLICA_WAIT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
            clock,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pause between probes. Zero gives a tight loop.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Block until `database.table`'s replica is available.
    ///
    /// The timeout is checked before every probe. Errors from the probe end
    /// the wait immediately; they are never retried.
    ///
    /// # Errors
    ///
    /// [`DiffError::PollTimeout`], [`DiffError::UnexpectedRowCount`],
    /// [`DiffError::UnexpectedColumnCount`], [`DiffError::Query`] or
    /// [`DiffError::Scan`].
    pub fn wait_available<Q>(
        &self,
        backend: &Q,
        database: &str,
        table: &str,
    ) -> DiffResult<PollReport>
    where
        Q: QueryCapability + ?Sized,
    {
        let started = self.clock.now();
        let mut state = PollState::Polling { attempts: 0 };

        loop {
            state = match state {
                PollState::Polling { attempts } => {
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    if elapsed > self.timeout {
                        PollState::Failed(DiffError::PollTimeout {
                            database: database.to_owned(),
                            table: table.to_owned(),
                            elapsed,
                        })
                    } else {
                        let attempts = attempts.saturating_add(1);
                        match probe_replica(backend, database, table) {
                            Ok(ProbeStatus::Available) => PollState::Ready(PollReport {
                                database: database.to_owned(),
                                table: table.to_owned(),
                                attempts,
                                elapsed: self.clock.now().saturating_duration_since(started),
                            }),
                            Ok(ProbeStatus::Pending) => {
                                debug!(database, table, attempts, "replica not available yet");
                                self.clock.sleep(self.interval);
                                PollState::Polling { attempts }
                            }
                            Err(err) => PollState::Failed(err),
                        }
                    }
                }
                PollState::Ready(report) => {
                    info!(
                        database,
                        table,
                        attempts = report.attempts,
                        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                        "replica available"
                    );
                    return Ok(report);
                }
                PollState::Failed(err) => {
                    warn!(database, table, error = %err, "replica wait failed");
                    return Err(err);
                }
            };
        }
    }

    /// Wait for every table in `tables`, in order. Each table gets its own
    /// full timeout.
    ///
    /// # Errors
    ///
    /// Stops at the first table whose wait fails and returns that error.
    pub fn wait_all<Q, S>(
        &self,
        backend: &Q,
        database: &str,
        tables: &[S],
    ) -> DiffResult<Vec<PollReport>>
    where
        Q: QueryCapability + ?Sized,
        S: AsRef<str>,
    {
        tables
            .iter()
            .map(|t| self.wait_available(backend, database, t.as_ref()))
            .collect()
    }
}
