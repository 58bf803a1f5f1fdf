//! Query capability seam and the embedded SQLite backend.
//!
//! The [`QueryCapability`] trait abstracts over the engines under test. The
//! comparison core only ever sees a [`RowCursor`] lent to it for the length
//! of one closure call, so the backend releases the cursor on every exit
//! path, including early `?` returns.

use std::path::Path;

use rusqlite::Connection;
use rusqlite::types::ValueRef;
use tracing::debug;

use crate::result_set::Cell;
use crate::{DiffError, DiffResult};

/// Backend-level failure, carried as the engine's own message.
pub type BackendResult<T> = Result<T, String>;

// ─── Traits ─────────────────────────────────────────────────────────────

/// A forward-only cursor over a query response.
pub trait RowCursor {
    /// Column names from the response metadata, in result order.
    fn columns(&self) -> &[String];

    /// Move to the next row. Returns `false` once the response is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the engine-specific error as a string.
    fn advance(&mut self) -> BackendResult<bool>;

    /// Read cell `idx` of the current row.
    ///
    /// # Errors
    ///
    /// Returns the engine-specific error as a string, including when the
    /// cursor is not positioned on a row.
    fn read_cell(&mut self, idx: usize) -> BackendResult<Cell>;
}

/// Something that can run SQL and lend out a cursor over the response.
pub trait QueryCapability {
    /// Run `sql` and hand the open cursor to `f`. The cursor is closed when
    /// `f` returns.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::Query`] if the engine rejects the query, or
    /// whatever `f` returns.
    fn with_cursor<R, F>(&self, sql: &str, f: F) -> DiffResult<R>
    where
        F: FnOnce(&mut dyn RowCursor) -> DiffResult<R>;

    /// Run one or more statements that produce no rows (DDL, DML).
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::Query`] on failure.
    fn execute_batch(&self, sql: &str) -> DiffResult<()>;
}

// ─── SQLite backend (rusqlite) ──────────────────────────────────────────

/// Embedded SQLite backend powered by rusqlite with the bundled feature.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::Query`] if the connection fails.
    pub fn open_in_memory() -> DiffResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| query_error(":memory:", &e))?;
        Ok(Self { conn })
    }

    /// Open the database file at `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::Query`] if the connection fails.
    pub fn open(path: impl AsRef<Path>) -> DiffResult<Self> {
        let path = path.as_ref();
        let conn =
            Connection::open(path).map_err(|e| query_error(&path.display().to_string(), &e))?;
        debug!(path = %path.display(), "opened sqlite backend");
        Ok(Self { conn })
    }

    /// The underlying rusqlite connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl QueryCapability for SqliteBackend {
    fn with_cursor<R, F>(&self, sql: &str, f: F) -> DiffResult<R>
    where
        F: FnOnce(&mut dyn RowCursor) -> DiffResult<R>,
    {
        let mut stmt = self.conn.prepare(sql).map_err(|e| query_error(sql, &e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let rows = stmt.query([]).map_err(|e| query_error(sql, &e))?;
        let mut cursor = SqliteCursor {
            columns,
            rows,
            current: Vec::new(),
        };
        f(&mut cursor)
    }

    fn execute_batch(&self, sql: &str) -> DiffResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| query_error(sql, &e))
    }
}

struct SqliteCursor<'stmt> {
    columns: Vec<String>,
    rows: rusqlite::Rows<'stmt>,
    current: Vec<BackendResult<Cell>>,
}

impl RowCursor for SqliteCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn advance(&mut self) -> BackendResult<bool> {
        self.current.clear();
        match self.rows.next() {
            Ok(Some(row)) => {
                for idx in 0..self.columns.len() {
                    self.current.push(
                        row.get_ref(idx)
                            .map(cell_from_value_ref)
                            .map_err(|e| e.to_string()),
                    );
                }
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e.to_string()),
        }
    }

    fn read_cell(&mut self, idx: usize) -> BackendResult<Cell> {
        match self.current.get(idx) {
            Some(cell) => cell.clone(),
            None => Err(format!(
                "cell {idx} out of range (row has {} cells)",
                self.current.len()
            )),
        }
    }
}

/// Map a SQLite value to the bytes a text-protocol driver would return.
fn cell_from_value_ref(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(i) => Cell::Bytes(i.to_string().into_bytes()),
        ValueRef::Real(f) => Cell::Bytes(f.to_string().into_bytes()),
        ValueRef::Text(b) | ValueRef::Blob(b) => Cell::Bytes(b.to_vec()),
    }
}

fn query_error(sql: &str, err: &rusqlite::Error) -> DiffError {
    DiffError::Query {
        sql: sql.to_owned(),
        message: err.to_string(),
    }
}

// ─── Connection templating ──────────────────────────────────────────────

/// Placeholder replaced by the database name in connection patterns.
pub const DATABASE_PLACEHOLDER: &str = "{db}";

/// A connection string with `{db}` placeholders, e.g.
/// `root@tcp(127.0.0.1:4000)/{db}` or `/var/tmp/{db}.row.sqlite`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTemplate {
    pattern: String,
}

impl ConnectionTemplate {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// Substitute every placeholder with `database`.
    #[must_use]
    pub fn for_database(&self, database: &str) -> String {
        self.pattern.replace(DATABASE_PLACEHOLDER, database)
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
