//! Cursor → [`ResultSet`] normalization.

use crate::backend::{QueryCapability, RowCursor};
use crate::result_set::{ResultSet, Row};
use crate::{DiffError, DiffResult};

/// Rows reserved up front; the buffer grows geometrically past this.
pub const INITIAL_ROW_CAPACITY: usize = 8;

/// Drain `cursor` into a [`ResultSet`].
///
/// Reads exactly one cell per column for every row. Row widths are not
/// re-checked here; the loop below is what guarantees them.
///
/// # Errors
///
/// Returns [`DiffError::Scan`] with the cursor's message if any row or cell
/// read fails. No partial result is returned.
pub fn normalize<C>(cursor: &mut C) -> DiffResult<ResultSet>
where
    C: RowCursor + ?Sized,
{
    let columns = cursor.columns().to_vec();
    let width = columns.len();
    let mut rows: Vec<Row> = Vec::with_capacity(INITIAL_ROW_CAPACITY);

    while cursor.advance().map_err(DiffError::Scan)? {
        let mut row = Vec::with_capacity(width);
        for idx in 0..width {
            row.push(cursor.read_cell(idx).map_err(DiffError::Scan)?);
        }
        rows.push(row);
    }

    Ok(ResultSet::from_normalized(columns, rows))
}

/// Run `sql` on `backend` and normalize the response.
///
/// # Errors
///
/// Returns [`DiffError::Query`] if the backend rejects the query and
/// [`DiffError::Scan`] if reading the response fails.
pub fn query_result_set<Q>(backend: &Q, sql: &str) -> DiffResult<ResultSet>
where
    Q: QueryCapability + ?Sized,
{
    backend.with_cursor(sql, |cursor| normalize(cursor))
}
