use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::DiffResult;

/// JSON schema version for `report.json`.
pub const REPORT_SCHEMA_V1: &str = "pushdown-diff.report.v1";

/// Verdict for one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Both backends returned the same rows.
    Matched,
    /// Both backends answered, with different results.
    Mismatched,
    /// At least one backend failed to answer.
    Error,
}

/// Per-case entry in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub sql: String,
    pub status: CaseStatus,
    /// Human-readable reason for a non-matching verdict.
    pub detail: Option<String>,
    /// Row count on the row engine, when it answered.
    pub row_engine_rows: Option<usize>,
    /// Row count on the replica, when it answered.
    pub replica_rows: Option<usize>,
    /// SHA-256 of the row engine's canonical rendering.
    pub row_engine_sha256: Option<String>,
    /// SHA-256 of the replica's canonical rendering.
    pub replica_sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub errors: usize,
}

/// Top-level report for a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub database: String,
    pub summary: RunSummary,
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_V1.to_owned(),
            database: database.into(),
            summary: RunSummary::default(),
            cases: Vec::new(),
        }
    }

    /// Record a case and update the summary.
    pub fn push(&mut self, case: CaseReport) {
        self.summary.total += 1;
        match case.status {
            CaseStatus::Matched => self.summary.matched += 1,
            CaseStatus::Mismatched => self.summary.mismatched += 1,
            CaseStatus::Error => self.summary.errors += 1,
        }
        self.cases.push(case);
    }

    #[must_use]
    pub fn all_matched(&self) -> bool {
        self.summary.matched == self.summary.total
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases
            .iter()
            .filter(|c| c.status != CaseStatus::Matched)
    }

    /// # Errors
    ///
    /// Returns [`crate::DiffError::Json`] if serialization fails.
    pub fn to_pretty_json(&self) -> DiffResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DiffError::Io`] or [`crate::DiffError::Json`].
    pub fn write_json(&self, path: &Path) -> DiffResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_pretty_json()?)?;
        Ok(())
    }
}
