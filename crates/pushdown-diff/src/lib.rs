//! Differential result-set checking between a row engine and its columnar
//! replica.
//!
//! This crate provides the infrastructure for:
//! - **Normalization**: turning a backend cursor into a [`ResultSet`] of
//!   nullable byte cells
//! - **Canonical comparison**: order-independent, byte-exact, NULL-aware
//!   equality between two result sets
//! - **Rendering**: a deterministic tab-separated text form for reports
//! - **Replica readiness**: polling replica metadata before comparing
//! - **Orchestration**: running a directory of `.sql` cases on both backends

use std::time::Duration;

pub mod backend;
pub mod compare;
pub mod normalize;
pub mod render;
pub mod replica;
pub mod report;
pub mod result_set;
pub mod runner;

pub use backend::{ConnectionTemplate, QueryCapability, RowCursor, SqliteBackend};
pub use compare::{Comparator, NullOrder};
pub use normalize::{normalize, query_result_set};
pub use render::{render_to_string, write_result_set};
pub use replica::{Clock, PollReport, ReplicaPoller, SystemClock};
pub use result_set::{Cell, ResultSet, Row};

/// Default database name used when none is configured.
pub const DEFAULT_DATABASE: &str = "test";

/// Settings shared by every component of a run.
///
/// This struct is the single source of truth for knobs that must be applied
/// consistently across the poller and the comparator. The database name is
/// threaded explicitly from here into every call; nothing reads it from
/// process-wide state.
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    /// Database (schema) holding the tables under test.
    pub database: String,
    /// Upper bound on how long to wait for a replica to become available.
    pub poll_timeout: Duration,
    /// Fixed pause between two replica probes. Zero polls in a tight loop.
    pub poll_interval: Duration,
    /// How NULL cells sort relative to byte cells during canonical ordering.
    pub null_order: NullOrder,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_owned(),
            poll_timeout: replica::REPLICA_WAIT_TIMEOUT,
            poll_interval: replica::DEFAULT_POLL_INTERVAL,
            null_order: NullOrder::default(),
        }
    }
}

impl HarnessSettings {
    /// Build a wall-clock [`ReplicaPoller`] from these settings.
    #[must_use]
    pub fn to_poller(&self) -> ReplicaPoller<SystemClock> {
        self.to_poller_with_clock(SystemClock)
    }

    /// Build a [`ReplicaPoller`] driven by `clock`.
    #[must_use]
    pub fn to_poller_with_clock<C: Clock>(&self, clock: C) -> ReplicaPoller<C> {
        ReplicaPoller::with_clock(clock)
            .timeout(self.poll_timeout)
            .interval(self.poll_interval)
    }

    /// Build a [`Comparator`] from these settings.
    #[must_use]
    pub fn to_comparator(&self) -> Comparator {
        Comparator::new(self.null_order)
    }
}

/// Result type alias used throughout the harness.
pub type DiffResult<T> = Result<T, DiffError>;

/// Errors that can arise while normalizing, comparing or polling.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A cursor failed while rows were being read.
    #[error("scan: {0}")]
    Scan(String),

    /// The backend rejected a query.
    #[error("query failed: {message} (sql: {sql})")]
    Query { sql: String, message: String },

    /// The two result sets do not expose the same columns in the same order.
    #[error("column mismatch: expected {expected:?}, got {actual:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// The two result sets do not hold the same number of rows.
    #[error("row count mismatch: expected {expected}, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },

    /// A cell differs after canonical ordering.
    #[error("cell mismatch at row {row}, column `{column}`: expected {expected}, got {actual}")]
    CellMismatch {
        row: usize,
        column: String,
        expected: Cell,
        actual: Cell,
    },

    /// The replica probe did not return exactly one row.
    #[error("invalid replica status for {database}.{table}: expected 1 row, got {rows}")]
    UnexpectedRowCount {
        database: String,
        table: String,
        rows: usize,
    },

    /// The replica probe row did not have exactly one column.
    #[error("invalid replica status for {database}.{table}: expected 1 column, got {columns}")]
    UnexpectedColumnCount {
        database: String,
        table: String,
        columns: usize,
    },

    /// The replica did not become available in time.
    #[error("replica {database}.{table} not available after {elapsed:?}")]
    PollTimeout {
        database: String,
        table: String,
        elapsed: Duration,
    },

    /// A row does not have one cell per column.
    #[error("row {row} has {actual} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// An I/O error from the filesystem.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid run configuration.
    #[error("config: {0}")]
    Config(String),
}

impl DiffError {
    /// Whether this error is a semantic divergence between the two result
    /// sets, as opposed to a failure to obtain them.
    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(
            self,
            Self::ColumnMismatch { .. } | Self::RowCountMismatch { .. } | Self::CellMismatch { .. }
        )
    }
}
