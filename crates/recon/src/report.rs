use serde::Serialize;

use fuelgrid_core::RawRow;

use crate::policy::SkipReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Mapping,
    Persistence,
}

/// A row that could not be ingested, with enough context to resubmit it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// 1-based data row index.
    pub row: usize,
    pub data: RawRow,
    pub error: String,
    pub kind: ErrorKind,
}

impl RowError {
    pub fn new(data: RawRow, error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            row: data.row,
            data,
            error: error.into(),
            kind,
        }
    }
}

/// Terminal state of one data row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Inserted,
    Updated,
    Skipped(SkipReason),
    Errored(RowError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub locations: usize,
    pub products: usize,
    pub stations: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipBreakdown {
    pub identical: usize,
    pub stale: usize,
    pub superseded_in_file: usize,
}

/// Result of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
    pub summary: String,
    pub skip_reasons: SkipBreakdown,
    pub entity_inserts: EntityStats,
    pub entity_updates: EntityStats,
    pub duration_ms: u64,
}

impl IngestReport {
    /// Fold per-row outcomes into run counters.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = RowOutcome>) -> Self {
        let mut report = outcomes
            .into_iter()
            .fold(Self::default(), |mut acc, outcome| {
                acc.processed += 1;
                match outcome {
                    RowOutcome::Inserted => acc.inserted += 1,
                    RowOutcome::Updated => acc.updated += 1,
                    RowOutcome::Skipped(reason) => {
                        acc.skipped += 1;
                        match reason {
                            SkipReason::Identical => acc.skip_reasons.identical += 1,
                            SkipReason::Stale => acc.skip_reasons.stale += 1,
                            SkipReason::SupersededInFile => acc.skip_reasons.superseded_in_file += 1,
                        }
                    }
                    RowOutcome::Errored(e) => acc.errors.push(e),
                }
                acc
            });
        report.summary = report.summary_sentence();
        report
    }

    /// Sentence listing the non-zero counters, e.g.
    /// "3 rows processed: 1 inserted, 1 skipped, 1 error."
    pub fn summary_sentence(&self) -> String {
        if self.processed == 0 {
            return "No rows processed.".to_string();
        }
        let parts: Vec<String> = [
            (self.inserted, "inserted", "inserted"),
            (self.updated, "updated", "updated"),
            (self.skipped, "skipped", "skipped"),
            (self.errors.len(), "error", "errors"),
        ]
        .into_iter()
        .filter(|(n, _, _)| *n > 0)
        .map(|(n, one, many)| format!("{n} {}", if n == 1 { one } else { many }))
        .collect();

        let rows = if self.processed == 1 { "row" } else { "rows" };
        format!("{} {rows} processed: {}.", self.processed, parts.join(", "))
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
