//! Case orchestration.
//!
//! A case is one `.sql` file holding a single query. [`DiffRunner`] runs
//! each case on the row engine and on the replica, normalizes both answers,
//! compares them canonically, and keeps both renderings so failures can be
//! written out for inspection.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::backend::QueryCapability;
use crate::compare::Comparator;
use crate::normalize::query_result_set;
use crate::render::render_to_string;
use crate::report::{CaseReport, CaseStatus, RunReport};
use crate::{DiffError, DiffResult};

/// File extension of case files.
pub const CASE_EXTENSION: &str = "sql";

// ─── Cases ──────────────────────────────────────────────────────────────

/// A named query to run on both backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffCase {
    pub name: String,
    pub sql: String,
}

impl DiffCase {
    #[must_use]
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Load every `*.sql` file in `dir` as a case, sorted by file name. The case
/// name is the file stem.
///
/// # Errors
///
/// Returns [`DiffError::Io`] if the directory or a file cannot be read, and
/// [`DiffError::Config`] if there are no cases or a case file is blank.
pub fn load_cases(dir: &Path) -> DiffResult<Vec<DiffCase>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == CASE_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(DiffError::Config(format!(
            "no .{CASE_EXTENSION} cases in {}",
            dir.display()
        )));
    }

    let mut cases = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sql = fs::read_to_string(&path)?.trim().to_owned();
        if sql.is_empty() {
            return Err(DiffError::Config(format!("case {name} is empty")));
        }
        cases.push(DiffCase { name, sql });
    }
    debug!(dir = %dir.display(), count = cases.len(), "loaded cases");
    Ok(cases)
}

// ─── Outcomes ───────────────────────────────────────────────────────────

/// Result of one case plus the canonical renderings of both answers.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub report: CaseReport,
    pub row_engine_text: Option<String>,
    pub replica_text: Option<String>,
}

impl CaseOutcome {
    #[must_use]
    pub fn status(&self) -> CaseStatus {
        self.report.status
    }

    fn error(case: &DiffCase, detail: String) -> Self {
        Self {
            report: CaseReport {
                name: case.name.clone(),
                sql: case.sql.clone(),
                status: CaseStatus::Error,
                detail: Some(detail),
                row_engine_rows: None,
                replica_rows: None,
                row_engine_sha256: None,
                replica_sha256: None,
            },
            row_engine_text: None,
            replica_text: None,
        }
    }
}

// ─── Runner ─────────────────────────────────────────────────────────────

/// Runs cases against a row engine (the reference) and its replica.
pub struct DiffRunner<'a, A: ?Sized, B: ?Sized> {
    row_engine: &'a A,
    replica: &'a B,
    comparator: Comparator,
}

impl<'a, A, B> DiffRunner<'a, A, B>
where
    A: QueryCapability + ?Sized,
    B: QueryCapability + ?Sized,
{
    #[must_use]
    pub const fn new(row_engine: &'a A, replica: &'a B, comparator: Comparator) -> Self {
        Self {
            row_engine,
            replica,
            comparator,
        }
    }

    /// Run one case on both backends and compare.
    #[must_use]
    pub fn run_case(&self, case: &DiffCase) -> CaseOutcome {
        let expected = query_result_set(self.row_engine, &case.sql);
        let actual = query_result_set(self.replica, &case.sql);

        let (mut expected, mut actual) = match (expected, actual) {
            (Ok(e), Ok(a)) => (e, a),
            (e, a) => {
                let detail = [
                    e.err().map(|err| format!("row engine: {err}")),
                    a.err().map(|err| format!("replica: {err}")),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("; ");
                warn!(case = %case.name, %detail, "case failed to run");
                return CaseOutcome::error(case, detail);
            }
        };

        let verdict = self.comparator.assert_equivalent(&mut expected, &mut actual);
        // Column and row-count mismatches return before sorting.
        self.comparator.sort(&mut expected);
        self.comparator.sort(&mut actual);

        let (status, detail) = match verdict {
            Ok(()) => (CaseStatus::Matched, None),
            Err(err) if err.is_mismatch() => (CaseStatus::Mismatched, Some(err.to_string())),
            Err(err) => (CaseStatus::Error, Some(err.to_string())),
        };
        match status {
            CaseStatus::Matched => info!(case = %case.name, rows = expected.len(), "case matched"),
            _ => warn!(
                case = %case.name,
                detail = detail.as_deref().unwrap_or(""),
                "case diverged"
            ),
        }

        CaseOutcome {
            report: CaseReport {
                name: case.name.clone(),
                sql: case.sql.clone(),
                status,
                detail,
                row_engine_rows: Some(expected.len()),
                replica_rows: Some(actual.len()),
                row_engine_sha256: Some(expected.digest()),
                replica_sha256: Some(actual.digest()),
            },
            row_engine_text: Some(render_to_string(&expected)),
            replica_text: Some(render_to_string(&actual)),
        }
    }

    /// Run every case in order.
    #[must_use]
    pub fn run_all(&self, cases: &[DiffCase]) -> Vec<CaseOutcome> {
        cases.iter().map(|c| self.run_case(c)).collect()
    }
}

/// Fold outcomes into a [`RunReport`].
#[must_use]
pub fn build_report(database: &str, outcomes: &[CaseOutcome]) -> RunReport {
    let mut report = RunReport::new(database);
    for outcome in outcomes {
        report.push(outcome.report.clone());
    }
    report
}

// ─── Failure artifacts ──────────────────────────────────────────────────

/// First line (1-based) where two renderings differ, with both sides.
#[must_use]
pub fn first_difference<'t>(
    a: &'t str,
    b: &'t str,
) -> Option<(usize, Option<&'t str>, Option<&'t str>)> {
    let mut left = a.lines();
    let mut right = b.lines();
    let mut line = 0usize;
    loop {
        line += 1;
        match (left.next(), right.next()) {
            (None, None) => return None,
            (l, r) if l == r => {}
            (l, r) => return Some((line, l, r)),
        }
    }
}

/// Write the artifacts of a non-matching case into `dir`:
///
/// - `<case>.row.txt` / `<case>.replica.txt`: canonical renderings
/// - `<case>.diff.md`: verdict, query, digests and first differing line
///
/// Returns the paths written.
///
/// # Errors
///
/// Returns [`DiffError::Io`] if a file cannot be written.
pub fn write_failure_artifacts(outcome: &CaseOutcome, dir: &Path) -> DiffResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let name = &outcome.report.name;
    let mut written = Vec::with_capacity(3);

    if let Some(text) = &outcome.row_engine_text {
        let path = dir.join(format!("{name}.row.txt"));
        fs::write(&path, text)?;
        written.push(path);
    }
    if let Some(text) = &outcome.replica_text {
        let path = dir.join(format!("{name}.replica.txt"));
        fs::write(&path, text)?;
        written.push(path);
    }

    let report = &outcome.report;
    let mut diff = String::new();
    let _ = writeln!(diff, "# Case `{name}`\n");
    let _ = writeln!(diff, "**Status:** {:?}", report.status);
    if let Some(detail) = &report.detail {
        let _ = writeln!(diff, "**Detail:** {detail}");
    }
    let _ = writeln!(diff, "\n```sql\n{}\n```\n", report.sql);
    if let (Some(r), Some(p)) = (&report.row_engine_sha256, &report.replica_sha256) {
        let _ = writeln!(diff, "- **Row engine SHA-256:** `{r}`");
        let _ = writeln!(diff, "- **Replica SHA-256:** `{p}`\n");
    }
    if let (Some(r), Some(p)) = (&outcome.row_engine_text, &outcome.replica_text) {
        if let Some((line, left, right)) = first_difference(r, p) {
            let _ = writeln!(diff, "## First differing line ({line})\n");
            let _ = writeln!(diff, "- **Row engine:** `{}`", left.unwrap_or("<missing>"));
            let _ = writeln!(diff, "- **Replica:** `{}`", right.unwrap_or("<missing>"));
        }
    }

    let path = dir.join(format!("{name}.diff.md"));
    fs::write(&path, diff)?;
    written.push(path);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteBackend;

    fn backend(setup: &str) -> SqliteBackend {
        let b = SqliteBackend::open_in_memory().unwrap();
        b.execute_batch(setup).unwrap();
        b
    }

    #[test]
    fn matching_case_with_different_physical_order() {
        let row = backend(
            "CREATE TABLE t (id INTEGER, v TEXT);
             INSERT INTO t VALUES (1, 'a'), (2, NULL), (3, 'c');",
        );
        let replica = backend(
            "CREATE TABLE t (id INTEGER, v TEXT);
             INSERT INTO t VALUES (3, 'c'), (1, 'a'), (2, NULL);",
        );
        let runner = DiffRunner::new(&row, &replica, Comparator::default());
        let outcome = runner.run_case(&DiffCase::new("all", "SELECT id, v FROM t"));
        assert_eq!(outcome.status(), CaseStatus::Matched, "{:?}", outcome.report.detail);
        assert_eq!(outcome.report.row_engine_sha256, outcome.report.replica_sha256);
        assert_eq!(
            outcome.row_engine_text.as_deref(),
            Some("id\tv\n1\ta\n2\tNULL\n3\tc\n")
        );
    }

    #[test]
    fn mismatching_case_reports_cell() {
        let row = backend("CREATE TABLE t (v TEXT); INSERT INTO t VALUES (NULL);");
        let replica = backend("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('NULL');");
        let runner = DiffRunner::new(&row, &replica, Comparator::default());
        let outcome = runner.run_case(&DiffCase::new("nulls", "SELECT v FROM t"));
        assert_eq!(outcome.status(), CaseStatus::Mismatched);
        let detail = outcome.report.detail.unwrap();
        assert!(detail.contains("column `v`"), "{detail}");
        assert!(detail.contains("row 0"), "{detail}");
    }

    #[test]
    fn query_failure_is_an_error_case() {
        let row = backend("CREATE TABLE t (v TEXT);");
        let replica = backend("CREATE TABLE other (x INTEGER);");
        let runner = DiffRunner::new(&row, &replica, Comparator::default());
        let outcome = runner.run_case(&DiffCase::new("missing", "SELECT v FROM t"));
        assert_eq!(outcome.status(), CaseStatus::Error);
        let detail = outcome.report.detail.unwrap();
        assert!(detail.starts_with("replica: "), "{detail}");
        assert!(outcome.row_engine_text.is_none());
    }

    #[test]
    fn build_report_summarizes_outcomes() {
        let row = backend("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);");
        let replica = backend("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (2);");
        let runner = DiffRunner::new(&row, &replica, Comparator::default());
        let outcomes = runner.run_all(&[
            DiffCase::new("count", "SELECT count(*) AS n FROM t"),
            DiffCase::new("values", "SELECT v FROM t"),
        ]);
        let report = build_report("test", &outcomes);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.matched, 1);
        assert_eq!(report.summary.mismatched, 1);
    }

    #[test]
    fn load_cases_sorted_and_trimmed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.sql"), "SELECT 2;\n").unwrap();
        fs::write(tmp.path().join("a.sql"), "  SELECT 1\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        let cases = load_cases(tmp.path()).unwrap();
        assert_eq!(
            cases,
            vec![DiffCase::new("a", "SELECT 1"), DiffCase::new("b", "SELECT 2;")]
        );
    }

    #[test]
    fn load_cases_rejects_empty_dir_and_blank_case() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(load_cases(tmp.path()), Err(DiffError::Config(_))));
        fs::write(tmp.path().join("blank.sql"), "  \n").unwrap();
        assert!(matches!(load_cases(tmp.path()), Err(DiffError::Config(_))));
    }

    #[test]
    fn first_difference_finds_line() {
        assert_eq!(first_difference("a\nb\n", "a\nb\n"), None);
        assert_eq!(
            first_difference("h\n1\n2\n", "h\n1\n3\n"),
            Some((3, Some("2"), Some("3")))
        );
        assert_eq!(first_difference("h\n1\n", "h\n"), Some((2, Some("1"), None)));
    }

    #[test]
    fn failure_artifacts_written() {
        let row = backend("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (2);");
        let replica = backend("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (3);");
        let runner = DiffRunner::new(&row, &replica, Comparator::default());
        let outcome = runner.run_case(&DiffCase::new("q1", "SELECT v FROM t"));
        assert_eq!(outcome.status(), CaseStatus::Mismatched);

        let tmp = tempfile::tempdir().unwrap();
        let written = write_failure_artifacts(&outcome, tmp.path()).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(
            fs::read_to_string(tmp.path().join("q1.replica.txt")).unwrap(),
            "v\n1\n3\n"
        );
        let diff = fs::read_to_string(tmp.path().join("q1.diff.md")).unwrap();
        assert!(diff.contains("**Status:** Mismatched"), "{diff}");
        assert!(diff.contains("## First differing line (3)"), "{diff}");
        assert!(diff.contains("- **Replica:** `3`"), "{diff}");
    }
}
