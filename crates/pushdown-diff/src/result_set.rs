//! Normalized result-set representation shared by both backends.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DiffError, DiffResult};

// ─── Cell ───────────────────────────────────────────────────────────────

/// A single nullable result cell.
///
/// Every backend value is captured as the raw bytes the driver hands back.
/// SQL NULL is its own variant: it is never the empty byte string and never
/// the text `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// SQL NULL.
    Null,
    /// Raw value bytes.
    Bytes(Vec<u8>),
}

impl Cell {
    /// Build a non-NULL cell from anything byte-like.
    #[must_use]
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(value.into())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The raw bytes, or `None` for NULL.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Null => None,
            Self::Bytes(b) => Some(b),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Option<&str>> for Cell {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Self::Null, Self::from)
    }
}

/// Diagnostic form: `NULL`, `'text'` for UTF-8 bytes, `X'..'` otherwise.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "'{s}'"),
                Err(_) => write!(f, "X'{}'", hex_encode(b)),
            },
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02X}");
    }
    s
}

// ─── ResultSet ──────────────────────────────────────────────────────────

/// A single row of cells, one per column.
pub type Row = Vec<Cell>;

/// Column names plus rows of nullable byte cells.
///
/// Every row holds exactly one cell per column. Once built, the only
/// mutation a result set allows is reordering its rows. Deserialization
/// goes through [`ResultSet::new`] and rejects ragged rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawResultSet")]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct RawResultSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TryFrom<RawResultSet> for ResultSet {
    type Error = DiffError;

    fn try_from(raw: RawResultSet) -> DiffResult<Self> {
        Self::new(raw.columns, raw.rows)
    }
}

impl ResultSet {
    /// Build a result set, rejecting rows whose width differs from the
    /// column count.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::RowWidth`] for the first ragged row.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> DiffResult<Self> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(DiffError::RowWidth {
                row,
                expected: columns.len(),
                actual: cells.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Build a result set whose row widths the caller already guarantees.
    pub(crate) const fn from_normalized(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Reorder rows in place. The sort is unstable.
    pub fn sort_rows_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Row, &Row) -> Ordering,
    {
        self.rows.sort_unstable_by(compare);
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }
}
