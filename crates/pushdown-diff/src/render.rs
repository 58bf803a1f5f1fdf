//! Deterministic tab-separated rendering of a [`ResultSet`].
//!
//! ```text
//! id<TAB>name
//! 1<TAB>NULL
//! ```
//!
//! The rendering is diagnostic only; equality decisions are made on the typed
//! cells by [`crate::compare`].

use sha2::{Digest, Sha256};

use crate::result_set::{Cell, ResultSet};

const NULL_TEXT: &[u8] = b"NULL";

/// Append the rendering of `rs` to `target`.
///
/// Rows are written in the set's current order. Byte cells are written raw.
///
/// # Panics
///
/// Panics if a row does not have one cell per column. That can only happen
/// through a normalization bug and must not be papered over.
pub fn write_result_set(rs: &ResultSet, target: &mut Vec<u8>) {
    let cols = rs.columns();
    for (i, c) in cols.iter().enumerate() {
        if i > 0 {
            target.push(b'\t');
        }
        target.extend_from_slice(c.as_bytes());
    }
    target.push(b'\n');

    for (row_idx, row) in rs.rows().iter().enumerate() {
        assert_eq!(
            row.len(),
            cols.len(),
            "row {row_idx} has {} cells but the result has {} columns",
            row.len(),
            cols.len()
        );
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                target.push(b'\t');
            }
            match cell {
                Cell::Null => target.extend_from_slice(NULL_TEXT),
                Cell::Bytes(b) => target.extend_from_slice(b),
            }
        }
        target.push(b'\n');
    }
}

/// Render `rs` into a `String`, replacing invalid UTF-8 sequences.
#[must_use]
pub fn render_to_string(rs: &ResultSet) -> String {
    let mut buf = Vec::new();
    write_result_set(rs, &mut buf);
    match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

impl ResultSet {
    /// SHA-256 hex digest of the rendering in the current row order.
    ///
    /// Sort with [`crate::Comparator::sort`] first for an order-independent
    /// fingerprint.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut buf = Vec::new();
        write_result_set(self, &mut buf);
        sha256_hex(&buf)
    }
}

/// Compute SHA-256 hex digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let digest = Sha256::digest(data);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
