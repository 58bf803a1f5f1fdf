//! Canonical ordering and equality of two result sets.
//!
//! Backends are free to return rows in any order, so both sides are sorted
//! by a total order over their cells before being compared position by
//! position. Equality is byte-exact and NULL-aware regardless of how NULL
//! sorts.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::result_set::{Cell, ResultSet};
use crate::{DiffError, DiffResult};

/// Where NULL cells land in the canonical row order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOrder {
    /// NULL sorts before every byte cell, the empty one included.
    #[default]
    First,
    /// NULL sorts as if it were the empty byte string.
    ///
    /// A NULL and an empty cell then tie, so two sets holding both can end
    /// up sorted differently and report a spurious [`DiffError::CellMismatch`].
    AsEmpty,
}

/// Order two cells.
#[must_use]
pub fn compare_cells(a: &Cell, b: &Cell, null_order: NullOrder) -> Ordering {
    match null_order {
        NullOrder::First => match (a, b) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Null, Cell::Bytes(_)) => Ordering::Less,
            (Cell::Bytes(_), Cell::Null) => Ordering::Greater,
            (Cell::Bytes(x), Cell::Bytes(y)) => x.cmp(y),
        },
        NullOrder::AsEmpty => a
            .as_bytes()
            .unwrap_or_default()
            .cmp(b.as_bytes().unwrap_or_default()),
    }
}

/// Order two rows cell by cell; the first differing column decides.
#[must_use]
pub fn compare_rows(a: &[Cell], b: &[Cell], null_order: NullOrder) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_cells(x, y, null_order))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Sorts and compares result sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Comparator {
    null_order: NullOrder,
}

impl Comparator {
    #[must_use]
    pub const fn new(null_order: NullOrder) -> Self {
        Self { null_order }
    }

    #[must_use]
    pub const fn null_order(&self) -> NullOrder {
        self.null_order
    }

    /// Sort rows into canonical order.
    pub fn sort(&self, rs: &mut ResultSet) {
        let order = self.null_order;
        rs.sort_rows_by(|a, b| compare_rows(a, b, order));
    }

    /// Check that `actual` holds the same rows as `expected`, in any order.
    ///
    /// Columns are checked first, then row counts; neither check touches row
    /// data. Only then are both sets sorted in place and compared pairwise.
    ///
    /// # Errors
    ///
    /// - [`DiffError::ColumnMismatch`] if the column lists differ in names
    ///   or order.
    /// - [`DiffError::RowCountMismatch`] if the row counts differ.
    /// - [`DiffError::CellMismatch`] for the first differing cell, with its
    ///   row index (in canonical order) and column name.
    /// - [`DiffError::RowWidth`] if a row does not have one cell per column.
    pub fn assert_equivalent(
        &self,
        expected: &mut ResultSet,
        actual: &mut ResultSet,
    ) -> DiffResult<()> {
        if expected.columns() != actual.columns() {
            warn!(
                expected = ?expected.columns(),
                actual = ?actual.columns(),
                "column lists differ"
            );
            return Err(DiffError::ColumnMismatch {
                expected: expected.columns().to_vec(),
                actual: actual.columns().to_vec(),
            });
        }
        if expected.len() != actual.len() {
            warn!(
                expected = expected.len(),
                actual = actual.len(),
                "row counts differ"
            );
            return Err(DiffError::RowCountMismatch {
                expected: expected.len(),
                actual: actual.len(),
            });
        }

        check_row_widths(expected)?;
        check_row_widths(actual)?;

        self.sort(expected);
        self.sort(actual);
        debug!(rows = expected.len(), columns = expected.width(), "comparing sorted rows");

        for (row_idx, (e_row, a_row)) in expected.rows().iter().zip(actual.rows()).enumerate() {
            for (col_idx, (e, a)) in e_row.iter().zip(a_row).enumerate() {
                if e != a {
                    let column = expected.columns()[col_idx].clone();
                    warn!(
                        row = row_idx,
                        column = %column,
                        expected = %e,
                        actual = %a,
                        "cell differs"
                    );
                    return Err(DiffError::CellMismatch {
                        row: row_idx,
                        column,
                        expected: e.clone(),
                        actual: a.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every row must hold exactly one cell per column.
fn check_row_widths(rs: &ResultSet) -> DiffResult<()> {
    let width = rs.width();
    match rs.rows().iter().position(|r| r.len() != width) {
        Some(row) => Err(DiffError::RowWidth {
            row,
            expected: width,
            actual: rs.rows()[row].len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result_set::Row;

    fn rs(columns: &[&str], rows: Vec<Row>) -> ResultSet {
        ResultSet::new(columns.iter().map(|c| (*c).to_owned()).collect(), rows).unwrap()
    }

    fn row(cells: &[Option<&str>]) -> Row {
        cells.iter().map(|c| Cell::from(*c)).collect()
    }

    #[test]
    fn permuted_rows_are_equivalent() {
        let rows = vec![
            row(&[Some("3"), Some("c")]),
            row(&[Some("1"), None]),
            row(&[Some("2"), Some("b")]),
            row(&[Some("1"), Some("a")]),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();
        let mut a = rs(&["id", "v"], rows);
        let mut b = rs(&["id", "v"], reversed);
        Comparator::default().assert_equivalent(&mut a, &mut b).unwrap();
    }

    #[test]
    fn duplicate_rows_count_as_multiset() {
        let mut a = rs(&["x"], vec![row(&[Some("1")]), row(&[Some("1")]), row(&[Some("2")])]);
        let mut b = rs(&["x"], vec![row(&[Some("1")]), row(&[Some("2")]), row(&[Some("2")])]);
        let err = Comparator::default()
            .assert_equivalent(&mut a, &mut b)
            .unwrap_err();
        assert!(matches!(err, DiffError::CellMismatch { row: 1, .. }), "{err}");
    }

    #[test]
    fn null_differs_from_text_null() {
        let mut a = rs(&["id", "name"], vec![row(&[Some("1"), None])]);
        let mut b = rs(&["id", "name"], vec![row(&[Some("1"), Some("NULL")])]);
        let err = Comparator::default()
            .assert_equivalent(&mut a, &mut b)
            .unwrap_err();
        match err {
            DiffError::CellMismatch {
                row,
                column,
                expected,
                actual,
            } => {
                assert_eq!(row, 0);
                assert_eq!(column, "name");
                assert_eq!(expected, Cell::Null);
                assert_eq!(actual, Cell::from("NULL"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn null_differs_from_empty() {
        let mut a = rs(&["v"], vec![row(&[None])]);
        let mut b = rs(&["v"], vec![row(&[Some("")])]);
        assert!(matches!(
            Comparator::default().assert_equivalent(&mut a, &mut b),
            Err(DiffError::CellMismatch { .. })
        ));
    }

    #[test]
    fn column_mismatch_short_circuits_before_rows() {
        let rows_a = vec![row(&[Some("2"), Some("x")]), row(&[Some("1"), Some("y")])];
        let mut a = rs(&["a", "b"], rows_a.clone());
        let mut b = rs(&["a", "c"], vec![row(&[Some("9"), Some("z")])]);
        let err = Comparator::default()
            .assert_equivalent(&mut a, &mut b)
            .unwrap_err();
        assert!(matches!(err, DiffError::ColumnMismatch { .. }));
        // Rows were never sorted.
        assert_eq!(a.rows(), rows_a.as_slice());
    }

    #[test]
    fn column_order_matters() {
        let mut a = rs(&["a", "b"], Vec::new());
        let mut b = rs(&["b", "a"], Vec::new());
        assert!(matches!(
            Comparator::default().assert_equivalent(&mut a, &mut b),
            Err(DiffError::ColumnMismatch { .. })
        ));
    }

    #[test]
    fn row_count_mismatch_short_circuits() {
        let rows_a = vec![row(&[Some("3")]), row(&[Some("1")]), row(&[Some("2")])];
        let mut a = rs(&["n"], rows_a.clone());
        let mut b = rs(&["n"], vec![row(&[Some("1")]), row(&[Some("2")])]);
        let err = Comparator::default()
            .assert_equivalent(&mut a, &mut b)
            .unwrap_err();
        assert!(matches!(
            err,
            DiffError::RowCountMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(a.rows(), rows_a.as_slice());
    }

    #[test]
    fn empty_sets_with_same_columns_match() {
        let mut a = rs(&["n"], Vec::new());
        let mut b = rs(&["n"], Vec::new());
        Comparator::default().assert_equivalent(&mut a, &mut b).unwrap();
    }

    #[test]
    fn ordering_is_bytewise_lexicographic() {
        let order = NullOrder::First;
        assert_eq!(compare_cells(&Cell::from("10"), &Cell::from("9"), order), Ordering::Less);
        assert_eq!(compare_cells(&Cell::from("a"), &Cell::from("ab"), order), Ordering::Less);
        assert_eq!(
            compare_rows(
                &row(&[Some("1"), Some("b")]),
                &row(&[Some("1"), Some("a")]),
                order
            ),
            Ordering::Greater
        );
    }

    #[test]
    fn null_first_orders_null_below_empty() {
        assert_eq!(
            compare_cells(&Cell::Null, &Cell::from(""), NullOrder::First),
            Ordering::Less
        );
        assert_eq!(
            compare_cells(&Cell::Null, &Cell::Null, NullOrder::First),
            Ordering::Equal
        );
    }

    #[test]
    fn as_empty_ties_null_with_empty() {
        assert_eq!(
            compare_cells(&Cell::Null, &Cell::from(""), NullOrder::AsEmpty),
            Ordering::Equal
        );
        assert_eq!(
            compare_cells(&Cell::Null, &Cell::from("a"), NullOrder::AsEmpty),
            Ordering::Less
        );
    }

    #[test]
    fn null_first_verdict_is_independent_of_input_order() {
        let rows = vec![row(&[None]), row(&[Some("")]), row(&[None]), row(&[Some("")])];
        let shuffled = vec![row(&[Some("")]), row(&[None]), row(&[Some("")]), row(&[None])];
        let cmp = Comparator::new(NullOrder::First);
        let mut a = rs(&["v"], rows);
        let mut b = rs(&["v"], shuffled);
        cmp.assert_equivalent(&mut a, &mut b).unwrap();
        assert_eq!(a.rows()[0], vec![Cell::Null]);
        assert_eq!(a.rows()[3], vec![Cell::from("")]);
    }

    #[test]
    fn large_reversed_input_matches() {
        let rows: Vec<Row> = (0..5_000)
            .map(|i: u32| {
                vec![
                    Cell::from((i % 97).to_string().as_str()),
                    Cell::from(i.to_string().as_str()),
                ]
            })
            .collect();
        let mut reversed = rows.clone();
        reversed.reverse();
        let mut a = rs(&["k", "v"], rows);
        let mut b = rs(&["k", "v"], reversed);
        Comparator::default().assert_equivalent(&mut a, &mut b).unwrap();
    }

    #[test]
    fn ragged_rows_are_rejected_before_comparing() {
        let mut short = ResultSet::from_normalized(
            vec!["a".to_owned(), "b".to_owned()],
            vec![vec![Cell::from("1")]],
        );
        let mut full = rs(&["a", "b"], vec![row(&[Some("1"), Some("2")])]);
        let err = Comparator::default()
            .assert_equivalent(&mut short, &mut full)
            .unwrap_err();
        assert!(
            matches!(
                err,
                DiffError::RowWidth {
                    row: 0,
                    expected: 2,
                    actual: 1
                }
            ),
            "{err}"
        );
        assert!(!err.is_mismatch());

        let err = Comparator::default()
            .assert_equivalent(&mut full, &mut short)
            .unwrap_err();
        assert!(matches!(err, DiffError::RowWidth { .. }), "{err}");
    }
}
